use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Access flags as stored in class_def_item, encoded_field and encoded_method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    pub fn is_public(&self) -> bool {
        self.contains(AccessFlags::PUBLIC)
    }

    pub fn is_private(&self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.contains(AccessFlags::PROTECTED)
    }

    pub fn is_static(&self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }

    /// Neither public, protected nor private.
    pub fn is_package_private(&self) -> bool {
        !self.intersects(AccessFlags::PUBLIC | AccessFlags::PROTECTED | AccessFlags::PRIVATE)
    }
}
