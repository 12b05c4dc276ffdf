//! In-memory class model consumed by the analysis core and handed back to the
//! container writer once odexed instructions have been rewritten.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dex::access::AccessFlags;
use crate::dex::descriptor::{self, MethodProto};
use crate::dex::instruction::Instruction;

/// A symbolic field reference, `Lcls;->name:T`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub type_desc: String,
}

impl FieldRef {
    pub fn new(class: &str, name: &str, type_desc: &str) -> Self {
        FieldRef { class: class.to_string(), name: name.to_string(), type_desc: type_desc.to_string() }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.type_desc)
    }
}

/// A symbolic method reference, `Lcls;->name(P)R`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub proto: MethodProto,
}

impl MethodRef {
    pub fn new(class: &str, name: &str, proto: MethodProto) -> Self {
        MethodRef { class: class.to_string(), name: name.to_string(), proto }
    }

    /// Builds a reference from a prototype string such as `(IJ)V`.
    pub fn parse(class: &str, name: &str, proto: &str) -> Result<Self, crate::dex::error::DexError> {
        Ok(MethodRef::new(class, name, MethodProto::parse(proto)?))
    }

    /// Same name, parameter types and return type.
    pub fn signature_matches(&self, other: &MethodRef) -> bool {
        self.name == other.name && self.proto == other.proto
    }

    pub fn with_class(&self, class: &str) -> MethodRef {
        MethodRef { class: class.to_string(), name: self.name.clone(), proto: self.proto.clone() }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub type_desc: String,
    pub access: AccessFlags,
}

impl FieldDef {
    pub fn new(name: &str, type_desc: &str, access: AccessFlags) -> Self {
        FieldDef { name: name.to_string(), type_desc: type_desc.to_string(), access }
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn reference(&self, class: &str) -> FieldRef {
        FieldRef::new(class, &self.name, &self.type_desc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// `None` for a catch-all handler.
    pub exception_type: Option<String>,
    pub handler_address: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryBlock {
    pub start_address: u32,
    pub code_unit_count: u32,
    pub handlers: Vec<ExceptionHandler>,
}

impl TryBlock {
    pub fn covers(&self, address: u32) -> bool {
        address >= self.start_address && address < self.start_address + self.code_unit_count
    }
}

/// A local variable entry from the debug info, live over `[start_address, end_address)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub register: u16,
    pub name: String,
    pub type_desc: String,
    pub start_address: u32,
    pub end_address: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodImpl {
    pub registers: u16,
    pub instructions: Vec<Instruction>,
    pub tries: Vec<TryBlock>,
    pub locals: Vec<LocalVariable>,
    /// (code address, source line) pairs in address order.
    pub lines: Vec<(u32, u32)>,
}

impl MethodImpl {
    pub fn new(registers: u16, instructions: Vec<Instruction>) -> Self {
        MethodImpl { registers, instructions, tries: Vec::new(), locals: Vec::new(), lines: Vec::new() }
    }

    /// Code address of every instruction, in code units.
    pub fn addresses(&self) -> Vec<u32> {
        let mut addresses = Vec::with_capacity(self.instructions.len());
        let mut address = 0u32;
        for insn in &self.instructions {
            addresses.push(address);
            address += insn.code_units() as u32;
        }
        addresses
    }

    pub fn line_at(&self, address: u32) -> Option<u32> {
        self.lines.iter().take_while(|(a, _)| *a <= address).last().map(|(_, line)| *line)
    }

    pub fn has_odex_instructions(&self) -> bool {
        self.instructions.iter().any(|i| i.opcode.odex_only())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub proto: MethodProto,
    pub access: AccessFlags,
    pub code: Option<MethodImpl>,
}

impl MethodDef {
    pub fn new(name: &str, proto: MethodProto, access: AccessFlags) -> Self {
        MethodDef { name: name.to_string(), proto, access, code: None }
    }

    pub fn with_code(mut self, code: MethodImpl) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// Direct methods are static, private or constructors; everything else is virtual.
    pub fn is_direct(&self) -> bool {
        self.access.intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
            || self.is_constructor()
    }

    pub fn is_virtual(&self) -> bool {
        !self.is_direct()
    }

    pub fn reference(&self, class: &str) -> MethodRef {
        MethodRef::new(class, &self.name, self.proto.clone())
    }

    /// Registers occupied by the parameters, including `this` for instance methods.
    pub fn parameter_register_count(&self) -> u16 {
        let this = if self.is_static() { 0 } else { 1 };
        self.proto.parameter_register_count() + this
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub descriptor: String,
    pub access: AccessFlags,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    pub fn new(descriptor: &str, access: AccessFlags, superclass: Option<&str>) -> Self {
        ClassDef {
            descriptor: descriptor.to_string(),
            access,
            superclass: superclass.map(String::from),
            interfaces: Vec::new(),
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn package(&self) -> &str {
        descriptor::package_of(&self.descriptor)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_static())
    }

    pub fn virtual_methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.is_virtual())
    }

    pub fn direct_methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.is_direct())
    }

    pub fn find_method(&self, name: &str, proto: &MethodProto) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name && &m.proto == proto)
    }

    /// Every field reference the class defines or uses in its code.
    pub fn field_references(&self) -> Vec<FieldRef> {
        let mut refs: Vec<FieldRef> = self.fields.iter().map(|f| f.reference(&self.descriptor)).collect();
        for code in self.methods.iter().filter_map(|m| m.code.as_ref()) {
            refs.extend(code.instructions.iter().filter_map(|i| i.field_ref().cloned()));
        }
        refs.sort();
        refs.dedup();
        refs
    }

    /// Every method reference the class defines or uses in its code.
    pub fn method_references(&self) -> Vec<MethodRef> {
        let mut refs: Vec<MethodRef> = self.methods.iter().map(|m| m.reference(&self.descriptor)).collect();
        for code in self.methods.iter().filter_map(|m| m.code.as_ref()) {
            refs.extend(code.instructions.iter().filter_map(|i| i.method_ref().cloned()));
        }
        refs.sort();
        refs.dedup();
        refs
    }
}
