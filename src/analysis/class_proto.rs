//! Resolved shape of a class as the target runtime computes it: superclass
//! chain, transitive interfaces, instance field offsets and vtable.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use log::warn;
use once_cell::unsync::OnceCell;

use crate::analysis::class_path::{ClassPath, UNKNOWN_CLASS};
use crate::analysis::error::{Resolved, UnresolvedClass};
use crate::analysis::field_layout::{self, FieldLayout};
use crate::analysis::vtable::{self, VtableEntry};
use crate::dex::class_def::{ClassDef, FieldRef};
use crate::dex::descriptor;

/// How an interface ended up in a class's interface set.
#[derive(Debug, Clone)]
pub enum InterfaceEntry {
    /// Declared by the class or by one of its declared interfaces, definition available.
    Direct(Rc<ClassDef>),
    /// Implemented through the superclass, or the class itself when it is an interface.
    Inherited,
    /// Named somewhere in the hierarchy but missing from the class path.
    Unresolved,
}

/// Interfaces of a class in resolution order.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMap {
    entries: Vec<(String, InterfaceEntry)>,
}

impl InterfaceMap {
    pub fn get(&self, descriptor: &str) -> Option<&InterfaceEntry> {
        self.entries.iter().find(|(d, _)| d == descriptor).map(|(_, e)| e)
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        self.get(descriptor).is_some()
    }

    /// Inserts unless already present; the first entry for a descriptor wins.
    fn insert(&mut self, descriptor: &str, entry: InterfaceEntry) {
        if !self.contains(descriptor) {
            self.entries.push((descriptor.to_string(), entry));
        }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }

    pub fn entries(&self) -> &[(String, InterfaceEntry)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum ProtoKind {
    Class(Option<Rc<ClassDef>>),
    Array,
    Unknown,
}

const BUSY_INTERFACES: u8 = 0x1;
const BUSY_FIELDS: u8 = 0x2;
const BUSY_VTABLE: u8 = 0x4;

pub struct ClassProto {
    descriptor: String,
    kind: ProtoKind,
    interfaces: OnceCell<Rc<Resolved<InterfaceMap>>>,
    fields: OnceCell<Rc<Resolved<FieldLayout>>>,
    vtable: OnceCell<Rc<Resolved<Vec<VtableEntry>>>>,
    busy: Cell<u8>,
}

impl fmt::Debug for ClassProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassProto({})", self.descriptor)
    }
}

impl ClassProto {
    fn with_kind(descriptor: &str, kind: ProtoKind) -> Self {
        ClassProto {
            descriptor: descriptor.to_string(),
            kind,
            interfaces: OnceCell::new(),
            fields: OnceCell::new(),
            vtable: OnceCell::new(),
            busy: Cell::new(0),
        }
    }

    pub(crate) fn class(descriptor: &str, def: Option<Rc<ClassDef>>) -> Self {
        ClassProto::with_kind(descriptor, ProtoKind::Class(def))
    }

    pub(crate) fn array(descriptor: &str) -> Self {
        ClassProto::with_kind(descriptor, ProtoKind::Array)
    }

    pub(crate) fn unknown() -> Self {
        ClassProto::with_kind(UNKNOWN_CLASS, ProtoKind::Unknown)
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, ProtoKind::Unknown)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ProtoKind::Array)
    }

    /// Whether the class definition is available. Arrays and the unknown
    /// sentinel count as resolved.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.kind, ProtoKind::Class(None))
    }

    pub fn class_def(&self) -> Result<&Rc<ClassDef>, UnresolvedClass> {
        match &self.kind {
            ProtoKind::Class(Some(def)) => Ok(def),
            _ => Err(UnresolvedClass::new(&self.descriptor)),
        }
    }

    pub fn is_interface(&self) -> Result<bool, UnresolvedClass> {
        match &self.kind {
            ProtoKind::Class(_) => Ok(self.class_def()?.is_interface()),
            ProtoKind::Array | ProtoKind::Unknown => Ok(false),
        }
    }

    pub fn superclass(&self) -> Result<Option<String>, UnresolvedClass> {
        match &self.kind {
            ProtoKind::Class(_) => Ok(self.class_def()?.superclass.clone()),
            ProtoKind::Array => Ok(Some(descriptor::OBJECT.to_string())),
            ProtoKind::Unknown => Ok(None),
        }
    }

    /// Number of array dimensions; zero for classes.
    pub fn dimensions(&self) -> usize {
        descriptor::array_dimensions(&self.descriptor)
    }

    /// `[[Lfoo;` -> `[Lfoo;`
    pub fn immediate_element_type(&self) -> Option<&str> {
        if self.is_array() {
            Some(descriptor::component_type(&self.descriptor))
        } else {
            None
        }
    }

    fn enter(&self, flag: u8) -> bool {
        let busy = self.busy.get();
        if busy & flag != 0 {
            return false;
        }
        self.busy.set(busy | flag);
        true
    }

    fn leave(&self, flag: u8) {
        self.busy.set(self.busy.get() & !flag);
    }

    /// Transitive interfaces, memoized.
    pub fn interfaces(&self, class_path: &ClassPath) -> Rc<Resolved<InterfaceMap>> {
        if let Some(interfaces) = self.interfaces.get() {
            return interfaces.clone();
        }
        if !self.enter(BUSY_INTERFACES) {
            warn!("Circular interface hierarchy through {}", self.descriptor);
            return Rc::new(Resolved::partial(InterfaceMap::default()));
        }
        let interfaces = Rc::new(self.compute_interfaces(class_path));
        self.leave(BUSY_INTERFACES);
        self.interfaces.get_or_init(|| interfaces).clone()
    }

    fn compute_interfaces(&self, class_path: &ClassPath) -> Resolved<InterfaceMap> {
        let mut map = InterfaceMap::default();
        let def = match &self.kind {
            ProtoKind::Class(Some(def)) => def.clone(),
            ProtoKind::Class(None) => return Resolved::partial(map),
            ProtoKind::Array => {
                map.insert(descriptor::CLONEABLE, InterfaceEntry::Inherited);
                map.insert(descriptor::SERIALIZABLE, InterfaceEntry::Inherited);
                return Resolved::complete(map);
            }
            ProtoKind::Unknown => return Resolved::complete(map),
        };

        let mut complete = true;
        for iface in &def.interfaces {
            if map.contains(iface) {
                continue;
            }
            match class_path.class_def(iface) {
                Ok(iface_def) => map.insert(iface, InterfaceEntry::Direct(iface_def)),
                Err(_) => {
                    map.insert(iface, InterfaceEntry::Unresolved);
                    complete = false;
                }
            }
            let iface_interfaces = class_path.class(iface).interfaces(class_path);
            for (sub, entry) in iface_interfaces.value.entries() {
                map.insert(sub, entry.clone());
            }
            complete &= iface_interfaces.complete;
        }

        if def.is_interface() {
            map.insert(&self.descriptor, InterfaceEntry::Inherited);
        }

        if let Some(superclass) = &def.superclass {
            let super_proto = class_path.class(superclass);
            if !super_proto.is_resolved() {
                complete = false;
            }
            let super_interfaces = super_proto.interfaces(class_path);
            for (iface, entry) in super_interfaces.value.entries() {
                let entry = match entry {
                    InterfaceEntry::Unresolved => InterfaceEntry::Unresolved,
                    _ => InterfaceEntry::Inherited,
                };
                map.insert(iface, entry);
            }
            complete &= super_interfaces.complete;
        }

        Resolved { value: map, complete }
    }

    /// Resolved interfaces declared by this class or by its declared
    /// interfaces, excluding those only reached through the superclass.
    pub fn direct_interfaces(&self, class_path: &ClassPath) -> Vec<Rc<ClassDef>> {
        self.interfaces(class_path)
            .value
            .entries()
            .iter()
            .filter_map(|(_, entry)| match entry {
                InterfaceEntry::Direct(def) => Some(def.clone()),
                _ => None,
            })
            .collect()
    }

    /// Membership test. Fails when the interface is known but unresolved, or
    /// when it is absent from an incomplete set so non-membership cannot be proven.
    pub fn implements_interface(&self, class_path: &ClassPath, iface: &str) -> Result<bool, UnresolvedClass> {
        let interfaces = self.interfaces(class_path);
        match interfaces.value.get(iface) {
            Some(InterfaceEntry::Unresolved) => Err(UnresolvedClass::new(iface)),
            Some(_) => Ok(true),
            None if !interfaces.complete => Err(UnresolvedClass::new(iface)),
            None => Ok(false),
        }
    }

    /// Superclasses from the immediate parent up to the root. A missing
    /// definition ends the chain with the unknown sentinel.
    pub fn superclass_chain(&self, class_path: &ClassPath) -> Vec<Rc<ClassProto>> {
        let mut chain: Vec<Rc<ClassProto>> = Vec::new();
        let mut next = self.superclass();
        loop {
            match next {
                Ok(Some(desc)) => {
                    if desc == self.descriptor || chain.iter().any(|c| c.descriptor == desc) {
                        warn!("Circular superclass chain through {}", desc);
                        chain.push(class_path.unknown_class());
                        break;
                    }
                    let proto = class_path.class(&desc);
                    next = proto.superclass();
                    chain.push(proto);
                }
                Ok(None) => break,
                Err(_) => {
                    chain.push(class_path.unknown_class());
                    break;
                }
            }
        }
        chain
    }

    /// Least common ancestor of two reference types.
    pub fn common_superclass(self: &Rc<Self>, class_path: &ClassPath, other: &Rc<ClassProto>) -> Rc<ClassProto> {
        if self.descriptor == other.descriptor {
            return self.clone();
        }
        if self.is_unknown() || other.is_unknown() {
            return unknown_common_superclass(class_path, self, other);
        }
        if self.is_array() || other.is_array() {
            return array_common_superclass(class_path, self, other);
        }
        if self.descriptor == descriptor::OBJECT {
            return self.clone();
        }
        if other.descriptor == descriptor::OBJECT {
            return other.clone();
        }

        let mut got_exception = false;
        match self.is_interface() {
            Ok(true) => {
                return match other.implements_interface(class_path, &self.descriptor) {
                    Ok(true) => self.clone(),
                    Ok(false) => class_path.object_class(),
                    Err(_) => class_path.unknown_class(),
                };
            }
            Ok(false) => {}
            Err(_) => got_exception = true,
        }
        match other.is_interface() {
            Ok(true) => {
                return match self.implements_interface(class_path, &other.descriptor) {
                    Ok(true) => other.clone(),
                    Ok(false) => class_path.object_class(),
                    Err(_) => class_path.unknown_class(),
                };
            }
            Ok(false) => {}
            Err(_) => got_exception = true,
        }
        if got_exception {
            return class_path.unknown_class();
        }

        let mut this_chain = vec![self.clone()];
        this_chain.extend(self.superclass_chain(class_path));
        this_chain.reverse();
        let mut other_chain = vec![other.clone()];
        other_chain.extend(other.superclass_chain(class_path));
        other_chain.reverse();

        // both chains now start at the root
        let shared = this_chain.len().min(other_chain.len());
        for i in (0..shared).rev() {
            if this_chain[i].descriptor == other_chain[i].descriptor {
                return this_chain[i].clone();
            }
        }
        class_path.unknown_class()
    }

    /// Instance field layout including inherited fields, memoized.
    pub fn field_layout(&self, class_path: &ClassPath) -> Result<Rc<Resolved<FieldLayout>>, UnresolvedClass> {
        let def = match &self.kind {
            ProtoKind::Class(_) => self.class_def()?.clone(),
            ProtoKind::Array | ProtoKind::Unknown => return class_path.object_class().field_layout(class_path),
        };
        if let Some(fields) = self.fields.get() {
            return Ok(fields.clone());
        }
        if !self.enter(BUSY_FIELDS) {
            warn!("Circular class hierarchy while laying out {}", self.descriptor);
            return Ok(Rc::new(Resolved::partial(FieldLayout::default())));
        }
        let layout = Rc::new(field_layout::compute(class_path, &def));
        self.leave(BUSY_FIELDS);
        Ok(self.fields.get_or_init(|| layout).clone())
    }

    pub fn field_by_offset(&self, class_path: &ClassPath, offset: u32) -> Result<Option<FieldRef>, UnresolvedClass> {
        Ok(self.field_layout(class_path)?.value.field_at(offset).cloned())
    }

    /// Virtual method table, memoized.
    pub fn vtable(&self, class_path: &ClassPath) -> Result<Rc<Resolved<Vec<VtableEntry>>>, UnresolvedClass> {
        let def = match &self.kind {
            ProtoKind::Class(_) => self.class_def()?.clone(),
            ProtoKind::Array | ProtoKind::Unknown => return class_path.object_class().vtable(class_path),
        };
        if let Some(vtable) = self.vtable.get() {
            return Ok(vtable.clone());
        }
        if !self.enter(BUSY_VTABLE) {
            warn!("Circular class hierarchy while building the vtable of {}", self.descriptor);
            return Ok(Rc::new(Resolved::partial(Vec::new())));
        }
        let table = Rc::new(vtable::compute(class_path, self, &def));
        self.leave(BUSY_VTABLE);
        Ok(self.vtable.get_or_init(|| table).clone())
    }

    pub fn method_by_vtable_index(
        &self,
        class_path: &ClassPath,
        index: usize,
    ) -> Result<Option<VtableEntry>, UnresolvedClass> {
        Ok(self.vtable(class_path)?.value.get(index).cloned())
    }
}

fn unknown_common_superclass(class_path: &ClassPath, a: &Rc<ClassProto>, b: &Rc<ClassProto>) -> Rc<ClassProto> {
    let known = if a.is_unknown() { b } else { a };
    if known.descriptor == descriptor::OBJECT {
        known.clone()
    } else {
        class_path.unknown_class()
    }
}

fn array_common_superclass(class_path: &ClassPath, a: &Rc<ClassProto>, b: &Rc<ClassProto>) -> Rc<ClassProto> {
    if !(a.is_array() && b.is_array()) {
        // an array only shares Object and its two marker interfaces with a class
        let (array, class) = if a.is_array() { (a, b) } else { (b, a) };
        if let Ok(true) = class.is_interface() {
            if let Ok(true) = array.implements_interface(class_path, &class.descriptor) {
                return class.clone();
            }
        }
        return class_path.object_class();
    }
    let a_element = descriptor::element_type(&a.descriptor);
    let b_element = descriptor::element_type(&b.descriptor);
    if a.dimensions() == b.dimensions() && descriptor::is_reference(a_element) && descriptor::is_reference(b_element) {
        let element = class_path.class(a_element).common_superclass(class_path, &class_path.class(b_element));
        if element.is_unknown() {
            return class_path.unknown_class();
        }
        return class_path.class(&format!("{}{}", "[".repeat(a.dimensions()), element.descriptor));
    }
    // a primitive array is an Object one dimension down
    let dims = object_dimensions(a).min(object_dimensions(b));
    if dims == 0 {
        return class_path.object_class();
    }
    class_path.class(&format!("{}{}", "[".repeat(dims), descriptor::OBJECT))
}

fn object_dimensions(array: &ClassProto) -> usize {
    let dims = array.dimensions();
    if descriptor::is_primitive(descriptor::element_type(&array.descriptor)) {
        dims - 1
    } else {
        dims
    }
}
