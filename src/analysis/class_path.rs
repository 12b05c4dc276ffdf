use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analysis::class_proto::ClassProto;
use crate::analysis::error::UnresolvedClass;
use crate::analysis::inline::InlineMethodResolver;
use crate::dex::class_def::ClassDef;
use crate::dex::descriptor;
use crate::dex::opcodes::{art_version_for_api, Opcodes, NO_VERSION};

/// Descriptor of the sentinel used when a type cannot be pinned down.
pub const UNKNOWN_CLASS: &str = "Ujava/lang/Object;";

/// First oat version using the size-ordered field comparator and the
/// largest-gap-first gap queue.
pub const ART_CURRENT_LAYOUT_VERSION: i32 = 67;

/// Runtime version parameters of a class path. Fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPathConfig {
    pub api_level: i32,
    /// Oat version of the ART compiler, or `NO_VERSION` for Dalvik.
    pub art_version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtLayoutVariant {
    /// Group then name ordering, smallest-gap-first gap queue.
    Legacy,
    /// References then decreasing size, largest-gap-first gap queue.
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldLayoutStrategy {
    Dalvik,
    Art(ArtLayoutVariant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VtableStrategy {
    Legacy,
    DefaultMethods,
}

impl ClassPathConfig {
    pub fn new(api_level: i32, art_version: i32) -> Self {
        ClassPathConfig { api_level, art_version }
    }

    pub fn dalvik(api_level: i32) -> Self {
        ClassPathConfig { api_level, art_version: NO_VERSION }
    }

    /// The configured ART version, or the one shipped with the API level.
    pub fn effective_art_version(&self) -> i32 {
        if self.art_version != NO_VERSION {
            self.art_version
        } else {
            art_version_for_api(self.api_level)
        }
    }

    pub fn is_art(&self) -> bool {
        self.effective_art_version() != NO_VERSION
    }

    pub fn field_layout_strategy(&self) -> FieldLayoutStrategy {
        if !self.is_art() {
            FieldLayoutStrategy::Dalvik
        } else if self.effective_art_version() >= ART_CURRENT_LAYOUT_VERSION {
            FieldLayoutStrategy::Art(ArtLayoutVariant::Current)
        } else {
            FieldLayoutStrategy::Art(ArtLayoutVariant::Legacy)
        }
    }

    pub fn vtable_strategy(&self) -> VtableStrategy {
        if self.api_level >= 24 {
            VtableStrategy::DefaultMethods
        } else {
            VtableStrategy::Legacy
        }
    }

    /// Package private methods in other packages cannot be overridden.
    pub fn check_package_private_access(&self) -> bool {
        self.api_level >= 17 || self.is_art()
    }

    /// Version of the execute-inline table used by the odex optimizer.
    pub fn inline_table_version(&self) -> u32 {
        if self.api_level < 11 {
            35
        } else {
            36
        }
    }
}

/// Source of class definitions, e.g. one dex file of a boot class path.
pub trait ClassProvider {
    fn class_def(&self, descriptor: &str) -> Option<Rc<ClassDef>>;
}

/// In-memory class set keyed by descriptor.
#[derive(Debug, Default, Clone)]
pub struct ClassSet {
    classes: HashMap<String, Rc<ClassDef>>,
}

impl ClassSet {
    pub fn new(classes: Vec<ClassDef>) -> Self {
        let mut set = ClassSet::default();
        for class in classes {
            set.add(class);
        }
        set
    }

    /// Later definitions of the same descriptor are ignored.
    pub fn add(&mut self, class: ClassDef) {
        self.classes.entry(class.descriptor.clone()).or_insert_with(|| Rc::new(class));
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassProvider for ClassSet {
    fn class_def(&self, descriptor: &str) -> Option<Rc<ClassDef>> {
        self.classes.get(descriptor).cloned()
    }
}

/// Shared lookup context for class prototypes.
///
/// Prototypes are created on first lookup and cached by descriptor, so every
/// layout and vtable is computed at most once per class path. The cache uses
/// interior mutability and is meant for single threaded use.
pub struct ClassPath {
    config: ClassPathConfig,
    field_layout: FieldLayoutStrategy,
    vtable: VtableStrategy,
    check_package_private: bool,
    providers: Vec<Box<dyn ClassProvider>>,
    classes: RefCell<HashMap<String, Rc<ClassProto>>>,
    unknown: Rc<ClassProto>,
    inline: InlineMethodResolver,
    opcodes: Arc<Opcodes>,
}

impl ClassPath {
    /// Providers are searched in order; the first definition of a descriptor wins.
    pub fn new(config: ClassPathConfig, providers: Vec<Box<dyn ClassProvider>>) -> Self {
        let field_layout = config.field_layout_strategy();
        let vtable = config.vtable_strategy();
        info!(
            "Class path for api {} (art version {}): {:?} field layout, {:?} vtables",
            config.api_level,
            config.effective_art_version(),
            field_layout,
            vtable
        );
        ClassPath {
            config,
            field_layout,
            vtable,
            check_package_private: config.check_package_private_access(),
            providers,
            classes: RefCell::new(HashMap::new()),
            unknown: Rc::new(ClassProto::unknown()),
            inline: InlineMethodResolver::for_version(config.inline_table_version()),
            opcodes: Opcodes::new(config.api_level, config.art_version),
        }
    }

    pub fn from_classes(config: ClassPathConfig, classes: Vec<ClassDef>) -> Self {
        ClassPath::new(config, vec![Box::new(ClassSet::new(classes))])
    }

    pub fn config(&self) -> ClassPathConfig {
        self.config
    }

    pub fn field_layout_strategy(&self) -> FieldLayoutStrategy {
        self.field_layout
    }

    pub fn vtable_strategy(&self) -> VtableStrategy {
        self.vtable
    }

    pub fn check_package_private_access(&self) -> bool {
        self.check_package_private
    }

    pub fn is_art(&self) -> bool {
        self.config.is_art()
    }

    pub fn inline_resolver(&self) -> &InlineMethodResolver {
        &self.inline
    }

    /// Replaces the built-in execute-inline table, e.g. with one dumped from a device.
    pub fn set_inline_resolver(&mut self, inline: InlineMethodResolver) {
        self.inline = inline;
    }

    pub fn opcodes(&self) -> &Opcodes {
        &self.opcodes
    }

    pub fn class_def(&self, descriptor: &str) -> Result<Rc<ClassDef>, UnresolvedClass> {
        self.providers
            .iter()
            .find_map(|p| p.class_def(descriptor))
            .ok_or_else(|| UnresolvedClass::new(descriptor))
    }

    /// Prototype for a class or array descriptor. Missing classes still get a
    /// prototype; queries that need the definition report `UnresolvedClass`.
    pub fn class(&self, descriptor: &str) -> Rc<ClassProto> {
        if descriptor == UNKNOWN_CLASS {
            return self.unknown.clone();
        }
        if let Some(proto) = self.classes.borrow().get(descriptor) {
            return proto.clone();
        }

        let proto = if descriptor::is_array(descriptor) {
            Rc::new(ClassProto::array(descriptor))
        } else {
            let def = self.class_def(descriptor).ok();
            if def.is_none() {
                debug!("Class {} not found on the class path", descriptor);
            }
            Rc::new(ClassProto::class(descriptor, def))
        };
        self.classes.borrow_mut().insert(descriptor.to_string(), proto.clone());
        proto
    }

    pub fn unknown_class(&self) -> Rc<ClassProto> {
        self.unknown.clone()
    }

    pub fn object_class(&self) -> Rc<ClassProto> {
        self.class(descriptor::OBJECT)
    }
}
