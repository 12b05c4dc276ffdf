use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dex::class_def::{FieldRef, MethodRef};
use crate::dex::descriptor::MethodProto;
use crate::dex::error::DexError;
use crate::dex::opcodes::{Format, Opcode, Opcodes, ReferenceType};

/// Resolves constant pool indices into symbolic references.
pub trait RefResolver {
    fn string(&self, idx: u32) -> Result<String, DexError>;
    fn type_desc(&self, idx: u32) -> Result<String, DexError>;
    fn field_ref(&self, idx: u32) -> Result<FieldRef, DexError>;
    fn method_ref(&self, idx: u32) -> Result<MethodRef, DexError>;
    fn proto(&self, idx: u32) -> Result<MethodProto, DexError>;
    fn call_site(&self, idx: u32) -> Result<String, DexError>;
    fn method_handle(&self, idx: u32) -> Result<String, DexError>;
}

/// Resolver that prints stable placeholders like `string@42`, for decoding
/// without a pool context.
pub struct PlaceholderResolver;

impl RefResolver for PlaceholderResolver {
    fn string(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("string@{}", idx))
    }
    fn type_desc(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("Ltype@{};", idx))
    }
    fn field_ref(&self, idx: u32) -> Result<FieldRef, DexError> {
        Ok(FieldRef::new(&format!("Lclass@{};", idx), &format!("field@{}", idx), "Ljava/lang/Object;"))
    }
    fn method_ref(&self, idx: u32) -> Result<MethodRef, DexError> {
        Ok(MethodRef::new(&format!("Lclass@{};", idx), &format!("method@{}", idx), MethodProto::new(&[], "V")))
    }
    fn proto(&self, _idx: u32) -> Result<MethodProto, DexError> {
        Ok(MethodProto::new(&[], "V"))
    }
    fn call_site(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("callsite@{}", idx))
    }
    fn method_handle(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("handle@{}", idx))
    }
}

/// Plain index tables, the shape a container reader hands over once its
/// id sections have been read.
#[derive(Debug, Clone, Default)]
pub struct ReferencePools {
    pub strings: Vec<String>,
    pub types: Vec<String>,
    pub fields: Vec<FieldRef>,
    pub methods: Vec<MethodRef>,
    pub protos: Vec<MethodProto>,
}

fn pool_item<T: Clone>(pool: &[T], idx: u32, kind: &str) -> Result<T, DexError> {
    match pool.get(idx as usize) {
        Some(item) => Ok(item.clone()),
        None => fail!("{} index {} out of range ({} entries)", kind, idx, pool.len()),
    }
}

impl RefResolver for ReferencePools {
    fn string(&self, idx: u32) -> Result<String, DexError> {
        pool_item(&self.strings, idx, "string")
    }
    fn type_desc(&self, idx: u32) -> Result<String, DexError> {
        pool_item(&self.types, idx, "type")
    }
    fn field_ref(&self, idx: u32) -> Result<FieldRef, DexError> {
        pool_item(&self.fields, idx, "field")
    }
    fn method_ref(&self, idx: u32) -> Result<MethodRef, DexError> {
        pool_item(&self.methods, idx, "method")
    }
    fn proto(&self, idx: u32) -> Result<MethodProto, DexError> {
        pool_item(&self.protos, idx, "proto")
    }
    fn call_site(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("callsite@{}", idx))
    }
    fn method_handle(&self, idx: u32) -> Result<String, DexError> {
        Ok(format!("handle@{}", idx))
    }
}

/// Operand reference of an instruction. Odexed instructions carry resolved
/// runtime indices instead of symbolic references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    String(String),
    Type(String),
    Field(FieldRef),
    Method(MethodRef),
    MethodProto(MethodProto),
    CallSite(String),
    MethodHandle(String),
    FieldOffset(u32),
    VtableIndex(u32),
    InlineIndex(u32),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::String(s) => write!(f, "{:?}", s),
            Reference::Type(t) => write!(f, "{}", t),
            Reference::Field(field) => write!(f, "{}", field),
            Reference::Method(method) => write!(f, "{}", method),
            Reference::MethodProto(proto) => write!(f, "{}", proto),
            Reference::CallSite(c) => write!(f, "{}", c),
            Reference::MethodHandle(h) => write!(f, "{}", h),
            Reference::FieldOffset(o) => write!(f, "field@{:#x}", o),
            Reference::VtableIndex(i) => write!(f, "vtable@{:#x}", i),
            Reference::InlineIndex(i) => write!(f, "inline@{:#x}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Targets are relative to the switch instruction, not the payload.
    PackedSwitch { first_key: i32, targets: Vec<i32> },
    SparseSwitch { keys: Vec<i32>, targets: Vec<i32> },
    ArrayData { element_width: u16, data: Vec<u8> },
}

/// One decoded instruction.
///
/// `registers` lists register operands in textual order (`iget vA, vB` is
/// `[A, B]`, an invoke lists its arguments, a range invoke is expanded).
/// `target` is a branch or payload offset in code units relative to the
/// instruction itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub registers: Vec<u16>,
    pub literal: Option<i64>,
    pub reference: Option<Reference>,
    pub reference2: Option<Reference>,
    pub target: Option<i32>,
    pub payload: Option<Payload>,
}

impl Instruction {
    pub fn new(opcode: Opcode, registers: &[u16]) -> Self {
        Instruction {
            opcode,
            registers: registers.to_vec(),
            literal: None,
            reference: None,
            reference2: None,
            target: None,
            payload: None,
        }
    }

    pub fn with_literal(mut self, literal: i64) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_target(mut self, target: i32) -> Self {
        self.target = Some(target);
        self
    }

    pub fn payload(payload: Payload) -> Self {
        let opcode = match payload {
            Payload::PackedSwitch { .. } => Opcode::PackedSwitchPayload,
            Payload::SparseSwitch { .. } => Opcode::SparseSwitchPayload,
            Payload::ArrayData { .. } => Opcode::ArrayPayload,
        };
        let mut insn = Instruction::new(opcode, &[]);
        insn.payload = Some(payload);
        insn
    }

    /// Same operands under a different opcode, used when deodexing.
    pub fn with_opcode(&self, opcode: Opcode) -> Self {
        let mut insn = self.clone();
        insn.opcode = opcode;
        insn
    }

    /// Size in 16-bit code units.
    pub fn code_units(&self) -> usize {
        if let Some(units) = self.opcode.format().code_units() {
            return units;
        }
        match &self.payload {
            Some(Payload::PackedSwitch { targets, .. }) => 4 + targets.len() * 2,
            Some(Payload::SparseSwitch { keys, .. }) => 2 + keys.len() * 4,
            Some(Payload::ArrayData { data, .. }) => 4 + (data.len() + 1) / 2,
            None => 1,
        }
    }

    pub fn register(&self, ix: usize) -> Option<u16> {
        self.registers.get(ix).copied()
    }

    pub fn field_ref(&self) -> Option<&FieldRef> {
        match &self.reference {
            Some(Reference::Field(f)) => Some(f),
            _ => None,
        }
    }

    pub fn method_ref(&self) -> Option<&MethodRef> {
        match &self.reference {
            Some(Reference::Method(m)) => Some(m),
            _ => None,
        }
    }

    pub fn type_ref(&self) -> Option<&str> {
        match &self.reference {
            Some(Reference::Type(t)) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let format = self.opcode.format();
        if let Some(payload) = &self.payload {
            return match payload {
                Payload::PackedSwitch { first_key, targets } => write!(f, " {:#x} {:?}", first_key, targets),
                Payload::SparseSwitch { keys, targets } => write!(f, " {:?} -> {:?}", keys, targets),
                Payload::ArrayData { element_width, data } => write!(f, " width={} bytes={}", element_width, data.len()),
            };
        }

        let mut sep = " ";
        let is_list = matches!(
            format,
            Format::Format35c | Format::Format35mi | Format::Format35ms | Format::Format45cc
        );
        if format.is_range() {
            match (self.registers.first(), self.registers.last()) {
                (Some(first), Some(last)) => write!(f, " {{v{} .. v{}}}", first, last)?,
                _ => write!(f, " {{}}")?,
            }
            sep = ", ";
        } else if is_list {
            let regs: Vec<String> = self.registers.iter().map(|r| format!("v{}", r)).collect();
            write!(f, " {{{}}}", regs.join(", "))?;
            sep = ", ";
        } else {
            for r in &self.registers {
                write!(f, "{}v{}", sep, r)?;
                sep = ", ";
            }
        }
        if let Some(reference) = &self.reference {
            write!(f, "{}{}", sep, reference)?;
            sep = ", ";
        }
        if let Some(reference) = &self.reference2 {
            write!(f, "{}{}", sep, reference)?;
            sep = ", ";
        }
        if let Some(literal) = self.literal {
            write!(f, "{}{:#x}", sep, literal)?;
            sep = ", ";
        }
        if let Some(target) = self.target {
            write!(f, "{}{:+}", sep, target)?;
        }
        Ok(())
    }
}

#[inline]
fn a4(unit: u16) -> u16 {
    (unit >> 8) & 0xf
}

#[inline]
fn b4(unit: u16) -> u16 {
    unit >> 12
}

#[inline]
fn a8(unit: u16) -> u16 {
    unit >> 8
}

#[inline]
fn u32_at(units: &[u16], ix: usize) -> u32 {
    (units[ix] as u32) | ((units[ix + 1] as u32) << 16)
}

fn resolve(resolver: &dyn RefResolver, kind: ReferenceType, idx: u32) -> Result<Option<Reference>, DexError> {
    Ok(Some(match kind {
        ReferenceType::None => return Ok(None),
        ReferenceType::String => Reference::String(resolver.string(idx)?),
        ReferenceType::Type => Reference::Type(resolver.type_desc(idx)?),
        ReferenceType::Field => Reference::Field(resolver.field_ref(idx)?),
        ReferenceType::Method => Reference::Method(resolver.method_ref(idx)?),
        ReferenceType::MethodProto => Reference::MethodProto(resolver.proto(idx)?),
        ReferenceType::CallSite => Reference::CallSite(resolver.call_site(idx)?),
        ReferenceType::MethodHandle => Reference::MethodHandle(resolver.method_handle(idx)?),
    }))
}

/// Lazily decodes a code-unit stream into `(address, Instruction)` pairs,
/// with one instruction of lookahead.
pub struct InstructionReader<'a> {
    units: &'a [u16],
    opcodes: &'a Opcodes,
    resolver: &'a dyn RefResolver,
    position: usize,
    peeked: Option<Result<(u32, Instruction), DexError>>,
}

impl<'a> InstructionReader<'a> {
    pub fn new(units: &'a [u16], opcodes: &'a Opcodes, resolver: &'a dyn RefResolver) -> Self {
        InstructionReader { units, opcodes, resolver, position: 0, peeked: None }
    }

    pub fn peek(&mut self) -> Option<&Result<(u32, Instruction), DexError>> {
        if self.peeked.is_none() {
            self.peeked = self.read_next();
        }
        self.peeked.as_ref()
    }

    fn read_next(&mut self) -> Option<Result<(u32, Instruction), DexError>> {
        if self.position >= self.units.len() {
            return None;
        }
        let address = self.position as u32;
        let result = self.decode_at(self.position).map(|insn| {
            self.position += insn.code_units();
            (address, insn)
        });
        if result.is_err() {
            // stop after the first malformed instruction
            self.position = self.units.len();
        }
        Some(result.map_err(|e| err!(e, "instruction at {:#x}", address)))
    }

    fn decode_at(&self, ix: usize) -> Result<Instruction, DexError> {
        let units = &self.units[ix..];
        let u0 = units[0];
        let value = match u0 {
            0x0100 | 0x0200 | 0x0300 => u0,
            _ => u0 & 0xff,
        };
        let opcode = match self.opcodes.opcode_for_value(value) {
            Some(op) => op,
            None => fail!("Unknown opcode value {:#x}", value),
        };
        let format = opcode.format();
        if let Some(size) = format.code_units() {
            if units.len() < size {
                fail!("Truncated {} instruction, need {} code units", opcode, size);
            }
        }

        let mut insn = Instruction::new(opcode, &[]);
        let kind = opcode.reference_type();
        match format {
            Format::Format10x => {}
            Format::Format10t => insn.target = Some((a8(u0) as u8 as i8) as i32),
            Format::Format11n => {
                insn.registers = vec![a4(u0)];
                insn.literal = Some((((b4(u0) as i8) << 4) >> 4) as i64);
            }
            Format::Format11x => insn.registers = vec![a8(u0)],
            Format::Format12x => insn.registers = vec![a4(u0), b4(u0)],
            Format::Format20bc => {
                insn.literal = Some(a8(u0) as i64);
                insn.reference = Some(Reference::Type(format!("ref@{}", units[1])));
            }
            Format::Format20t => insn.target = Some(units[1] as i16 as i32),
            Format::Format21c => {
                insn.registers = vec![a8(u0)];
                insn.reference = resolve(self.resolver, kind, units[1] as u32)?;
            }
            Format::Format21ih => {
                insn.registers = vec![a8(u0)];
                insn.literal = Some(((units[1] as i16 as i32) << 16) as i64);
            }
            Format::Format21lh => {
                insn.registers = vec![a8(u0)];
                insn.literal = Some((units[1] as i16 as i64) << 48);
            }
            Format::Format21s => {
                insn.registers = vec![a8(u0)];
                insn.literal = Some(units[1] as i16 as i64);
            }
            Format::Format21t => {
                insn.registers = vec![a8(u0)];
                insn.target = Some(units[1] as i16 as i32);
            }
            Format::Format22b => {
                insn.registers = vec![a8(u0), units[1] & 0xff];
                insn.literal = Some((units[1] >> 8) as u8 as i8 as i64);
            }
            Format::Format22c => {
                insn.registers = vec![a4(u0), b4(u0)];
                insn.reference = resolve(self.resolver, kind, units[1] as u32)?;
            }
            Format::Format22cs => {
                insn.registers = vec![a4(u0), b4(u0)];
                insn.reference = Some(Reference::FieldOffset(units[1] as u32));
            }
            Format::Format22s => {
                insn.registers = vec![a4(u0), b4(u0)];
                insn.literal = Some(units[1] as i16 as i64);
            }
            Format::Format22t => {
                insn.registers = vec![a4(u0), b4(u0)];
                insn.target = Some(units[1] as i16 as i32);
            }
            Format::Format22x => insn.registers = vec![a8(u0), units[1]],
            Format::Format23x => insn.registers = vec![a8(u0), units[1] & 0xff, units[1] >> 8],
            Format::Format30t => insn.target = Some(u32_at(units, 1) as i32),
            Format::Format31c => {
                insn.registers = vec![a8(u0)];
                insn.reference = resolve(self.resolver, kind, u32_at(units, 1))?;
            }
            Format::Format31i => {
                insn.registers = vec![a8(u0)];
                insn.literal = Some(u32_at(units, 1) as i32 as i64);
            }
            Format::Format31t => {
                insn.registers = vec![a8(u0)];
                insn.target = Some(u32_at(units, 1) as i32);
            }
            Format::Format32x => insn.registers = vec![units[1], units[2]],
            Format::Format35c | Format::Format35mi | Format::Format35ms | Format::Format45cc => {
                let count = b4(u0) as usize;
                if count > 5 {
                    fail!("Invalid register count {} for {}", count, opcode);
                }
                let packed = units[2];
                let all = [packed & 0xf, (packed >> 4) & 0xf, (packed >> 8) & 0xf, packed >> 12, a4(u0)];
                insn.registers = all[..count].to_vec();
                insn.reference = match format {
                    Format::Format35mi => Some(Reference::InlineIndex(units[1] as u32)),
                    Format::Format35ms => Some(Reference::VtableIndex(units[1] as u32)),
                    _ => resolve(self.resolver, kind, units[1] as u32)?,
                };
                if format == Format::Format45cc {
                    insn.reference2 = resolve(self.resolver, ReferenceType::MethodProto, units[3] as u32)?;
                }
            }
            Format::Format3rc | Format::Format3rmi | Format::Format3rms | Format::Format4rcc => {
                let count = a8(u0);
                let first = units[2];
                insn.registers = (0..count).map(|i| first.wrapping_add(i)).collect();
                insn.reference = match format {
                    Format::Format3rmi => Some(Reference::InlineIndex(units[1] as u32)),
                    Format::Format3rms => Some(Reference::VtableIndex(units[1] as u32)),
                    _ => resolve(self.resolver, kind, units[1] as u32)?,
                };
                if format == Format::Format4rcc {
                    insn.reference2 = resolve(self.resolver, ReferenceType::MethodProto, units[3] as u32)?;
                }
            }
            Format::Format51l => {
                insn.registers = vec![a8(u0)];
                let low = u32_at(units, 1) as u64;
                let high = u32_at(units, 3) as u64;
                insn.literal = Some((low | (high << 32)) as i64);
            }
            Format::PackedSwitchPayload => insn.payload = Some(decode_packed_switch(units)?),
            Format::SparseSwitchPayload => insn.payload = Some(decode_sparse_switch(units)?),
            Format::ArrayPayload => insn.payload = Some(decode_array_data(units)?),
        }
        Ok(insn)
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<(u32, Instruction), DexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.peeked.take() {
            Some(item) => Some(item),
            None => self.read_next(),
        }
    }
}

fn decode_packed_switch(units: &[u16]) -> Result<Payload, DexError> {
    if units.len() < 4 {
        fail!("Truncated packed-switch payload");
    }
    let size = units[1] as usize;
    if units.len() < 4 + size * 2 {
        fail!("Truncated packed-switch payload with {} targets", size);
    }
    let first_key = u32_at(units, 2) as i32;
    let targets = (0..size).map(|i| u32_at(units, 4 + i * 2) as i32).collect();
    Ok(Payload::PackedSwitch { first_key, targets })
}

fn decode_sparse_switch(units: &[u16]) -> Result<Payload, DexError> {
    let size = units.get(1).copied().unwrap_or(0) as usize;
    if units.len() < 2 + size * 4 {
        fail!("Truncated sparse-switch payload with {} entries", size);
    }
    let keys = (0..size).map(|i| u32_at(units, 2 + i * 2) as i32).collect();
    let targets = (0..size).map(|i| u32_at(units, 2 + size * 2 + i * 2) as i32).collect();
    Ok(Payload::SparseSwitch { keys, targets })
}

fn decode_array_data(units: &[u16]) -> Result<Payload, DexError> {
    if units.len() < 4 {
        fail!("Truncated array payload");
    }
    let element_width = units[1];
    let size = u32_at(units, 2) as usize;
    let byte_count = size * element_width as usize;
    if units.len() < 4 + (byte_count + 1) / 2 {
        fail!("Truncated array payload of {} bytes", byte_count);
    }
    let mut data = Vec::with_capacity(byte_count);
    for unit in &units[4..4 + (byte_count + 1) / 2] {
        data.push(*unit as u8);
        data.push((*unit >> 8) as u8);
    }
    data.truncate(byte_count);
    Ok(Payload::ArrayData { element_width, data })
}

/// Decodes a whole code-unit stream.
pub fn decode_instructions(
    units: &[u16],
    opcodes: &Opcodes,
    resolver: &dyn RefResolver,
) -> Result<Vec<Instruction>, DexError> {
    InstructionReader::new(units, opcodes, resolver)
        .map(|item| item.map(|(_, insn)| insn))
        .collect()
}
