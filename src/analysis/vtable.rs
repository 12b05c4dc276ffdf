use std::rc::Rc;

use log::warn;

use crate::analysis::class_path::{ClassPath, VtableStrategy};
use crate::analysis::class_proto::ClassProto;
use crate::analysis::error::Resolved;
use crate::dex::access::AccessFlags;
use crate::dex::class_def::{ClassDef, MethodDef, MethodRef};
use crate::dex::descriptor;

/// One vtable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtableEntry {
    /// The method as seen through the class that added the slot. Interface
    /// methods are relabeled with the implementing class.
    pub method: MethodRef,
    /// Class or interface that declares the method.
    pub origin: String,
    pub access: AccessFlags,
}

impl VtableEntry {
    fn declared(class: &str, method: &MethodDef) -> Self {
        VtableEntry { method: method.reference(class), origin: class.to_string(), access: method.access }
    }

    fn reparented(class: &str, iface: &str, method: &MethodDef) -> Self {
        VtableEntry { method: method.reference(class), origin: iface.to_string(), access: method.access }
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }
}

fn sorted_virtual_methods(def: &ClassDef) -> Vec<&MethodDef> {
    let mut methods: Vec<&MethodDef> = def.virtual_methods().collect();
    methods.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.proto.cmp(&b.proto)));
    methods
}

/// Package private methods can only be overridden from their own package.
fn can_override(class_path: &ClassPath, class: &str, existing: &VtableEntry) -> bool {
    !class_path.check_package_private_access()
        || !existing.access.is_package_private()
        || descriptor::same_package(&existing.method.class, class)
}

fn find_slot(class_path: &ClassPath, class: &str, table: &[VtableEntry], entry: &VtableEntry) -> Option<usize> {
    table
        .iter()
        .position(|existing| existing.method.signature_matches(&entry.method) && can_override(class_path, class, existing))
}

fn add_to_vtable(
    class_path: &ClassPath,
    class: &str,
    table: &mut Vec<VtableEntry>,
    entries: Vec<VtableEntry>,
    replace_existing: bool,
) {
    for entry in entries {
        match find_slot(class_path, class, table, &entry) {
            Some(ix) => {
                if replace_existing {
                    table[ix] = entry;
                }
            }
            None => table.push(entry),
        }
    }
}

fn is_interface(class_path: &ClassPath, descriptor: &str) -> bool {
    matches!(class_path.class(descriptor).is_interface(), Ok(true))
}

pub(crate) fn compute(class_path: &ClassPath, proto: &ClassProto, def: &ClassDef) -> Resolved<Vec<VtableEntry>> {
    let class = proto.descriptor();
    let mut table: Vec<VtableEntry> = Vec::new();
    let mut complete = true;

    if let Some(superclass) = &def.superclass {
        match class_path.class(superclass).vtable(class_path) {
            Ok(inherited) => {
                table.extend(inherited.value.iter().cloned());
                complete = inherited.complete;
            }
            Err(e) => {
                warn!("{} while building the vtable of {}, using {}", e, class, descriptor::OBJECT);
                if superclass != descriptor::OBJECT {
                    if let Ok(object) = class_path.object_class().vtable(class_path) {
                        table.extend(object.value.iter().cloned());
                    }
                }
                complete = false;
            }
        }
    }

    if def.is_interface() {
        return Resolved { value: table, complete };
    }
    let inherited_len = table.len();

    let own = sorted_virtual_methods(def).into_iter().map(|m| VtableEntry::declared(class, m)).collect();
    add_to_vtable(class_path, class, &mut table, own, true);

    let interfaces: Vec<Rc<ClassDef>> = proto.direct_interfaces(class_path);
    match class_path.vtable_strategy() {
        VtableStrategy::Legacy => {
            for iface in &interfaces {
                let entries = sorted_virtual_methods(iface)
                    .into_iter()
                    .map(|m| VtableEntry::reparented(class, &iface.descriptor, m))
                    .collect();
                add_to_vtable(class_path, class, &mut table, entries, false);
            }
        }
        VtableStrategy::DefaultMethods => {
            add_default_methods(class_path, class, &mut table, &interfaces, inherited_len);
            for iface in &interfaces {
                let entries = sorted_virtual_methods(iface)
                    .into_iter()
                    .filter(|m| m.access.is_abstract())
                    .map(|m| VtableEntry::reparented(class, &iface.descriptor, m))
                    .collect();
                add_to_vtable(class_path, class, &mut table, entries, false);
            }
        }
    }

    // slots of an unresolved interface are missing from the table
    complete &= proto.interfaces(class_path).complete;
    Resolved { value: table, complete }
}

/// Interface default methods fill slots left abstract or filled by a less
/// specific default; a concrete class method always wins.
fn add_default_methods(
    class_path: &ClassPath,
    class: &str,
    table: &mut Vec<VtableEntry>,
    interfaces: &[Rc<ClassDef>],
    inherited_len: usize,
) {
    for iface in interfaces {
        for method in sorted_virtual_methods(iface).into_iter().filter(|m| !m.access.is_abstract()) {
            let entry = VtableEntry::reparented(class, &iface.descriptor, method);
            let ix = match find_slot(class_path, class, table, &entry) {
                Some(ix) => ix,
                None => {
                    table.push(entry);
                    continue;
                }
            };

            let existing = &table[ix];
            if existing.origin == entry.origin {
                continue;
            }
            let existing_is_default = is_interface(class_path, &existing.origin);
            if !existing_is_default && !existing.is_abstract() {
                continue;
            }
            if existing_is_default {
                let narrower = class_path.class(&existing.origin).implements_interface(class_path, &entry.origin);
                if !matches!(narrower, Ok(false)) {
                    continue;
                }
            }

            let duplicate = ix < inherited_len;
            table[ix] = entry.clone();
            if duplicate {
                // overwriting an inherited abstract or default slot also appends a copy
                table.push(entry);
            }
        }
    }
}
