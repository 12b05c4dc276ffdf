use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use once_cell::sync::Lazy;
use rangemap::RangeInclusiveMap;
use serde::{Deserialize, Serialize};

/// Version value used when a runtime has no ART (oat) version, i.e. Dalvik.
pub const NO_VERSION: i32 = -1;

/// Kind of constant pool item an instruction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    None,
    String,
    Type,
    Field,
    Method,
    CallSite,
    MethodProto,
    MethodHandle,
}

/// Instruction formats, named after the Dalvik format ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20bc,
    Format20t,
    Format21c,
    Format21ih,
    Format21lh,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22cs,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format35mi,
    Format35ms,
    Format3rc,
    Format3rmi,
    Format3rms,
    Format45cc,
    Format4rcc,
    Format51l,
    PackedSwitchPayload,
    SparseSwitchPayload,
    ArrayPayload,
}

impl Format {
    /// Fixed size in 16-bit code units; payloads are variable sized.
    pub fn code_units(&self) -> Option<usize> {
        use Format::*;
        match self {
            Format10t | Format10x | Format11n | Format11x | Format12x => Some(1),
            Format20bc | Format20t | Format21c | Format21ih | Format21lh | Format21s | Format21t
            | Format22b | Format22c | Format22cs | Format22s | Format22t | Format22x
            | Format23x => Some(2),
            Format30t | Format31c | Format31i | Format31t | Format32x | Format35c | Format35mi
            | Format35ms | Format3rc | Format3rmi | Format3rms => Some(3),
            Format45cc | Format4rcc => Some(4),
            Format51l => Some(5),
            PackedSwitchPayload | SparseSwitchPayload | ArrayPayload => None,
        }
    }

    pub fn is_payload(&self) -> bool {
        self.code_units().is_none()
    }

    /// Register range formats (`{vC .. vN}`).
    pub fn is_range(&self) -> bool {
        matches!(self, Format::Format3rc | Format::Format3rmi | Format::Format3rms | Format::Format4rcc)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u32 {
        const CAN_THROW = 0x1;
        const ODEX_ONLY = 0x2;
        const CAN_CONTINUE = 0x4;
        const SETS_RESULT = 0x8;
        const SETS_REGISTER = 0x10;
        const SETS_WIDE_REGISTER = 0x20;
        const QUICK_FIELD_ACCESSOR = 0x40;
        const VOLATILE_FIELD_ACCESSOR = 0x80;
        const STATIC_FIELD_ACCESSOR = 0x100;
        const CAN_INITIALIZE_REFERENCE = 0x200;
    }
}

/// Every opcode known to any supported runtime, including the odex-only and
/// payload pseudo-opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Opcode {
    Nop, Move, MoveFrom16, Move16, MoveWide, MoveWideFrom16, MoveWide16, MoveObject,
    MoveObjectFrom16, MoveObject16, MoveResult, MoveResultWide, MoveResultObject, MoveException,
    ReturnVoid, Return, ReturnWide, ReturnObject,
    Const4, Const16, Const, ConstHigh16, ConstWide16, ConstWide32, ConstWide, ConstWideHigh16,
    ConstString, ConstStringJumbo, ConstClass,
    MonitorEnter, MonitorExit, CheckCast, InstanceOf, ArrayLength, NewInstance, NewArray,
    FilledNewArray, FilledNewArrayRange, FillArrayData, Throw, Goto, Goto16, Goto32,
    PackedSwitch, SparseSwitch,
    CmplFloat, CmpgFloat, CmplDouble, CmpgDouble, CmpLong,
    IfEq, IfNe, IfLt, IfGe, IfGt, IfLe, IfEqz, IfNez, IfLtz, IfGez, IfGtz, IfLez,
    Aget, AgetWide, AgetObject, AgetBoolean, AgetByte, AgetChar, AgetShort,
    Aput, AputWide, AputObject, AputBoolean, AputByte, AputChar, AputShort,
    Iget, IgetWide, IgetObject, IgetBoolean, IgetByte, IgetChar, IgetShort,
    Iput, IputWide, IputObject, IputBoolean, IputByte, IputChar, IputShort,
    Sget, SgetWide, SgetObject, SgetBoolean, SgetByte, SgetChar, SgetShort,
    Sput, SputWide, SputObject, SputBoolean, SputByte, SputChar, SputShort,
    InvokeVirtual, InvokeSuper, InvokeDirect, InvokeStatic, InvokeInterface,
    InvokeVirtualRange, InvokeSuperRange, InvokeDirectRange, InvokeStaticRange,
    InvokeInterfaceRange,
    NegInt, NotInt, NegLong, NotLong, NegFloat, NegDouble,
    IntToLong, IntToFloat, IntToDouble, LongToInt, LongToFloat, LongToDouble,
    FloatToInt, FloatToLong, FloatToDouble, DoubleToInt, DoubleToLong, DoubleToFloat,
    IntToByte, IntToChar, IntToShort,
    AddInt, SubInt, MulInt, DivInt, RemInt, AndInt, OrInt, XorInt, ShlInt, ShrInt, UshrInt,
    AddLong, SubLong, MulLong, DivLong, RemLong, AndLong, OrLong, XorLong, ShlLong, ShrLong,
    UshrLong,
    AddFloat, SubFloat, MulFloat, DivFloat, RemFloat,
    AddDouble, SubDouble, MulDouble, DivDouble, RemDouble,
    AddInt2addr, SubInt2addr, MulInt2addr, DivInt2addr, RemInt2addr, AndInt2addr, OrInt2addr,
    XorInt2addr, ShlInt2addr, ShrInt2addr, UshrInt2addr,
    AddLong2addr, SubLong2addr, MulLong2addr, DivLong2addr, RemLong2addr, AndLong2addr,
    OrLong2addr, XorLong2addr, ShlLong2addr, ShrLong2addr, UshrLong2addr,
    AddFloat2addr, SubFloat2addr, MulFloat2addr, DivFloat2addr, RemFloat2addr,
    AddDouble2addr, SubDouble2addr, MulDouble2addr, DivDouble2addr, RemDouble2addr,
    AddIntLit16, RsubInt, MulIntLit16, DivIntLit16, RemIntLit16, AndIntLit16, OrIntLit16,
    XorIntLit16,
    AddIntLit8, RsubIntLit8, MulIntLit8, DivIntLit8, RemIntLit8, AndIntLit8, OrIntLit8,
    XorIntLit8, ShlIntLit8, ShrIntLit8, UshrIntLit8,
    IgetVolatile, IputVolatile, SgetVolatile, SputVolatile, IgetObjectVolatile,
    IgetWideVolatile, IputWideVolatile, SgetWideVolatile, SputWideVolatile,
    IputObjectVolatile, SgetObjectVolatile, SputObjectVolatile,
    ThrowVerificationError, ExecuteInline, ExecuteInlineRange, InvokeDirectEmpty,
    InvokeObjectInitRange, ReturnVoidBarrier, ReturnVoidNoBarrier,
    IgetQuick, IgetWideQuick, IgetObjectQuick, IputQuick, IputWideQuick, IputObjectQuick,
    IputBooleanQuick, IputByteQuick, IputCharQuick, IputShortQuick,
    IgetBooleanQuick, IgetByteQuick, IgetCharQuick, IgetShortQuick,
    InvokeVirtualQuick, InvokeVirtualQuickRange, InvokeSuperQuick, InvokeSuperQuickRange,
    InvokePolymorphic, InvokePolymorphicRange, InvokeCustom, InvokeCustomRange,
    ConstMethodHandle, ConstMethodType,
    PackedSwitchPayload, SparseSwitchPayload, ArrayPayload,
}

/// Version ranges over which an opcode is encoded with a given value.
pub struct VersionConstraint {
    pub api_range: Option<RangeInclusive<i32>>,
    pub art_version_range: Option<RangeInclusive<i32>>,
    pub opcode_value: u16,
}

fn all_versions(opcode_value: u16) -> Vec<VersionConstraint> {
    vec![VersionConstraint {
        api_range: Some(i32::MIN..=i32::MAX),
        art_version_range: Some(i32::MIN..=i32::MAX),
        opcode_value,
    }]
}

fn api_range(opcode_value: u16, range: RangeInclusive<i32>) -> Vec<VersionConstraint> {
    vec![VersionConstraint { api_range: Some(range), art_version_range: None, opcode_value }]
}

fn art_range(opcode_value: u16, range: RangeInclusive<i32>) -> Vec<VersionConstraint> {
    vec![VersionConstraint { api_range: None, art_version_range: Some(range), opcode_value }]
}

fn first_api(opcode_value: u16, api: i32) -> Vec<VersionConstraint> {
    api_range(opcode_value, api..=i32::MAX)
}

fn all_apis(opcode_value: u16) -> Vec<VersionConstraint> {
    api_range(opcode_value, i32::MIN..=i32::MAX)
}

fn all_art_versions(opcode_value: u16) -> Vec<VersionConstraint> {
    art_range(opcode_value, i32::MIN..=i32::MAX)
}

fn combine(mut a: Vec<VersionConstraint>, b: Vec<VersionConstraint>) -> Vec<VersionConstraint> {
    a.extend(b);
    a
}

/// Static description of one opcode.
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub name: &'static str,
    pub reference_type: ReferenceType,
    pub format: Format,
    pub flags: OpcodeFlags,
    pub api_to_value_map: RangeInclusiveMap<i32, u16>,
    pub art_version_to_value_map: RangeInclusiveMap<i32, u16>,
}

impl OpcodeInfo {
    fn new(
        opcode: Opcode,
        name: &'static str,
        versions: Vec<VersionConstraint>,
        reference_type: ReferenceType,
        format: Format,
        flags: OpcodeFlags,
    ) -> Self {
        let mut api_to_value_map = RangeInclusiveMap::new();
        let mut art_version_to_value_map = RangeInclusiveMap::new();
        for vc in versions {
            if let Some(range) = vc.api_range.filter(|r| !r.is_empty()) {
                api_to_value_map.insert(range, vc.opcode_value);
            }
            if let Some(range) = vc.art_version_range.filter(|r| !r.is_empty()) {
                art_version_to_value_map.insert(range, vc.opcode_value);
            }
        }
        OpcodeInfo { opcode, name, reference_type, format, flags, api_to_value_map, art_version_to_value_map }
    }

    /// ART version mapping wins when the runtime is ART; Dalvik uses the API mapping.
    pub fn value_for(&self, api: i32, art_version: i32) -> Option<u16> {
        if art_version != NO_VERSION {
            self.art_version_to_value_map.get(&art_version).copied()
        } else {
            self.api_to_value_map.get(&api).copied()
        }
    }
}

static OPCODES: Lazy<Vec<OpcodeInfo>> = Lazy::new(|| {
    use Format::*;
    use Opcode as O;
    use ReferenceType as R;

    let cont = OpcodeFlags::CAN_CONTINUE;
    let throw = OpcodeFlags::CAN_THROW;
    let reg = OpcodeFlags::SETS_REGISTER;
    let wide = OpcodeFlags::SETS_REGISTER | OpcodeFlags::SETS_WIDE_REGISTER;
    let result = OpcodeFlags::SETS_RESULT;
    let odex = OpcodeFlags::ODEX_ONLY;
    let quick = OpcodeFlags::QUICK_FIELD_ACCESSOR;
    let volatile = OpcodeFlags::VOLATILE_FIELD_ACCESSOR;
    let stat = OpcodeFlags::STATIC_FIELD_ACCESSOR;
    let init = OpcodeFlags::CAN_INITIALIZE_REFERENCE;
    let none = OpcodeFlags::empty();
    let row = OpcodeInfo::new;

    let mut table = vec![
        row(O::Nop, "nop", all_versions(0x00), R::None, Format10x, cont),
        row(O::Move, "move", all_versions(0x01), R::None, Format12x, cont | reg),
        row(O::MoveFrom16, "move/from16", all_versions(0x02), R::None, Format22x, cont | reg),
        row(O::Move16, "move/16", all_versions(0x03), R::None, Format32x, cont | reg),
        row(O::MoveWide, "move-wide", all_versions(0x04), R::None, Format12x, cont | wide),
        row(O::MoveWideFrom16, "move-wide/from16", all_versions(0x05), R::None, Format22x, cont | wide),
        row(O::MoveWide16, "move-wide/16", all_versions(0x06), R::None, Format32x, cont | wide),
        row(O::MoveObject, "move-object", all_versions(0x07), R::None, Format12x, cont | reg),
        row(O::MoveObjectFrom16, "move-object/from16", all_versions(0x08), R::None, Format22x, cont | reg),
        row(O::MoveObject16, "move-object/16", all_versions(0x09), R::None, Format32x, cont | reg),
        row(O::MoveResult, "move-result", all_versions(0x0a), R::None, Format11x, cont | reg),
        row(O::MoveResultWide, "move-result-wide", all_versions(0x0b), R::None, Format11x, cont | wide),
        row(O::MoveResultObject, "move-result-object", all_versions(0x0c), R::None, Format11x, cont | reg),
        row(O::MoveException, "move-exception", all_versions(0x0d), R::None, Format11x, cont | reg),
        row(O::ReturnVoid, "return-void", all_versions(0x0e), R::None, Format10x, none),
        row(O::Return, "return", all_versions(0x0f), R::None, Format11x, none),
        row(O::ReturnWide, "return-wide", all_versions(0x10), R::None, Format11x, none),
        row(O::ReturnObject, "return-object", all_versions(0x11), R::None, Format11x, none),
        row(O::Const4, "const/4", all_versions(0x12), R::None, Format11n, cont | reg),
        row(O::Const16, "const/16", all_versions(0x13), R::None, Format21s, cont | reg),
        row(O::Const, "const", all_versions(0x14), R::None, Format31i, cont | reg),
        row(O::ConstHigh16, "const/high16", all_versions(0x15), R::None, Format21ih, cont | reg),
        row(O::ConstWide16, "const-wide/16", all_versions(0x16), R::None, Format21s, cont | wide),
        row(O::ConstWide32, "const-wide/32", all_versions(0x17), R::None, Format31i, cont | wide),
        row(O::ConstWide, "const-wide", all_versions(0x18), R::None, Format51l, cont | wide),
        row(O::ConstWideHigh16, "const-wide/high16", all_versions(0x19), R::None, Format21lh, cont | wide),
        row(O::ConstString, "const-string", all_versions(0x1a), R::String, Format21c, throw | cont | reg),
        row(O::ConstStringJumbo, "const-string/jumbo", all_versions(0x1b), R::String, Format31c, throw | cont | reg),
        row(O::ConstClass, "const-class", all_versions(0x1c), R::Type, Format21c, throw | cont | reg),
        row(O::MonitorEnter, "monitor-enter", all_versions(0x1d), R::None, Format11x, throw | cont),
        row(O::MonitorExit, "monitor-exit", all_versions(0x1e), R::None, Format11x, throw | cont),
        row(O::CheckCast, "check-cast", all_versions(0x1f), R::Type, Format21c, throw | cont | reg),
        row(O::InstanceOf, "instance-of", all_versions(0x20), R::Type, Format22c, throw | cont | reg),
        row(O::ArrayLength, "array-length", all_versions(0x21), R::None, Format12x, throw | cont | reg),
        row(O::NewInstance, "new-instance", all_versions(0x22), R::Type, Format21c, throw | cont | reg),
        row(O::NewArray, "new-array", all_versions(0x23), R::Type, Format22c, throw | cont | reg),
        row(O::FilledNewArray, "filled-new-array", all_versions(0x24), R::Type, Format35c, throw | cont | result),
        row(O::FilledNewArrayRange, "filled-new-array/range", all_versions(0x25), R::Type, Format3rc, throw | cont | result),
        row(O::FillArrayData, "fill-array-data", all_versions(0x26), R::None, Format31t, throw | cont),
        row(O::Throw, "throw", all_versions(0x27), R::None, Format11x, throw),
        row(O::Goto, "goto", all_versions(0x28), R::None, Format10t, none),
        row(O::Goto16, "goto/16", all_versions(0x29), R::None, Format20t, none),
        row(O::Goto32, "goto/32", all_versions(0x2a), R::None, Format30t, none),
        row(O::PackedSwitch, "packed-switch", all_versions(0x2b), R::None, Format31t, cont),
        row(O::SparseSwitch, "sparse-switch", all_versions(0x2c), R::None, Format31t, cont),
        row(O::CmplFloat, "cmpl-float", all_versions(0x2d), R::None, Format23x, cont | reg),
        row(O::CmpgFloat, "cmpg-float", all_versions(0x2e), R::None, Format23x, cont | reg),
        row(O::CmplDouble, "cmpl-double", all_versions(0x2f), R::None, Format23x, cont | reg),
        row(O::CmpgDouble, "cmpg-double", all_versions(0x30), R::None, Format23x, cont | reg),
        row(O::CmpLong, "cmp-long", all_versions(0x31), R::None, Format23x, cont | reg),
    ];

    let ifs = [
        (O::IfEq, "if-eq"), (O::IfNe, "if-ne"), (O::IfLt, "if-lt"),
        (O::IfGe, "if-ge"), (O::IfGt, "if-gt"), (O::IfLe, "if-le"),
    ];
    for (i, (op, name)) in ifs.into_iter().enumerate() {
        table.push(row(op, name, all_versions(0x32 + i as u16), R::None, Format22t, cont));
    }
    let ifzs = [
        (O::IfEqz, "if-eqz"), (O::IfNez, "if-nez"), (O::IfLtz, "if-ltz"),
        (O::IfGez, "if-gez"), (O::IfGtz, "if-gtz"), (O::IfLez, "if-lez"),
    ];
    for (i, (op, name)) in ifzs.into_iter().enumerate() {
        table.push(row(op, name, all_versions(0x38 + i as u16), R::None, Format21t, cont));
    }

    // aget..sput come in groups of seven: plain, wide, object, boolean, byte, char, short
    let accessor_groups: [(u16, [(Opcode, &'static str); 7], R, Format, OpcodeFlags); 6] = [
        (0x44, [(O::Aget, "aget"), (O::AgetWide, "aget-wide"), (O::AgetObject, "aget-object"),
            (O::AgetBoolean, "aget-boolean"), (O::AgetByte, "aget-byte"), (O::AgetChar, "aget-char"),
            (O::AgetShort, "aget-short")], R::None, Format23x, throw | cont | reg),
        (0x4b, [(O::Aput, "aput"), (O::AputWide, "aput-wide"), (O::AputObject, "aput-object"),
            (O::AputBoolean, "aput-boolean"), (O::AputByte, "aput-byte"), (O::AputChar, "aput-char"),
            (O::AputShort, "aput-short")], R::None, Format23x, throw | cont),
        (0x52, [(O::Iget, "iget"), (O::IgetWide, "iget-wide"), (O::IgetObject, "iget-object"),
            (O::IgetBoolean, "iget-boolean"), (O::IgetByte, "iget-byte"), (O::IgetChar, "iget-char"),
            (O::IgetShort, "iget-short")], R::Field, Format22c, throw | cont | reg),
        (0x59, [(O::Iput, "iput"), (O::IputWide, "iput-wide"), (O::IputObject, "iput-object"),
            (O::IputBoolean, "iput-boolean"), (O::IputByte, "iput-byte"), (O::IputChar, "iput-char"),
            (O::IputShort, "iput-short")], R::Field, Format22c, throw | cont),
        (0x60, [(O::Sget, "sget"), (O::SgetWide, "sget-wide"), (O::SgetObject, "sget-object"),
            (O::SgetBoolean, "sget-boolean"), (O::SgetByte, "sget-byte"), (O::SgetChar, "sget-char"),
            (O::SgetShort, "sget-short")], R::Field, Format21c, throw | cont | reg | stat),
        (0x67, [(O::Sput, "sput"), (O::SputWide, "sput-wide"), (O::SputObject, "sput-object"),
            (O::SputBoolean, "sput-boolean"), (O::SputByte, "sput-byte"), (O::SputChar, "sput-char"),
            (O::SputShort, "sput-short")], R::Field, Format21c, throw | cont | stat),
    ];
    for (base, ops, reference, format, flags) in accessor_groups {
        for (i, (op, name)) in ops.into_iter().enumerate() {
            let mut flags = flags;
            if i == 1 && flags.contains(reg) {
                flags |= wide;
            }
            table.push(row(op, name, all_versions(base + i as u16), reference, format, flags));
        }
    }

    let invokes = [
        (O::InvokeVirtual, "invoke-virtual", O::InvokeVirtualRange, "invoke-virtual/range"),
        (O::InvokeSuper, "invoke-super", O::InvokeSuperRange, "invoke-super/range"),
        (O::InvokeDirect, "invoke-direct", O::InvokeDirectRange, "invoke-direct/range"),
        (O::InvokeStatic, "invoke-static", O::InvokeStaticRange, "invoke-static/range"),
        (O::InvokeInterface, "invoke-interface", O::InvokeInterfaceRange, "invoke-interface/range"),
    ];
    for (i, (op, name, range_op, range_name)) in invokes.into_iter().enumerate() {
        let mut flags = throw | cont | result;
        if op == O::InvokeDirect {
            flags |= init;
        }
        table.push(row(op, name, all_versions(0x6e + i as u16), R::Method, Format35c, flags));
        table.push(row(range_op, range_name, all_versions(0x74 + i as u16), R::Method, Format3rc, flags));
    }

    let unary: [(Opcode, &'static str, bool); 21] = [
        (O::NegInt, "neg-int", false), (O::NotInt, "not-int", false),
        (O::NegLong, "neg-long", true), (O::NotLong, "not-long", true),
        (O::NegFloat, "neg-float", false), (O::NegDouble, "neg-double", true),
        (O::IntToLong, "int-to-long", true), (O::IntToFloat, "int-to-float", false),
        (O::IntToDouble, "int-to-double", true), (O::LongToInt, "long-to-int", false),
        (O::LongToFloat, "long-to-float", false), (O::LongToDouble, "long-to-double", true),
        (O::FloatToInt, "float-to-int", false), (O::FloatToLong, "float-to-long", true),
        (O::FloatToDouble, "float-to-double", true), (O::DoubleToInt, "double-to-int", false),
        (O::DoubleToLong, "double-to-long", true), (O::DoubleToFloat, "double-to-float", false),
        (O::IntToByte, "int-to-byte", false), (O::IntToChar, "int-to-char", false),
        (O::IntToShort, "int-to-short", false),
    ];
    for (i, (op, name, is_wide)) in unary.into_iter().enumerate() {
        let flags = if is_wide { cont | wide } else { cont | reg };
        table.push(row(op, name, all_versions(0x7b + i as u16), R::None, Format12x, flags));
    }

    // (op, op/2addr, name, wide result, can throw)
    let binary: [(Opcode, Opcode, &'static str, bool, bool); 32] = [
        (O::AddInt, O::AddInt2addr, "add-int", false, false),
        (O::SubInt, O::SubInt2addr, "sub-int", false, false),
        (O::MulInt, O::MulInt2addr, "mul-int", false, false),
        (O::DivInt, O::DivInt2addr, "div-int", false, true),
        (O::RemInt, O::RemInt2addr, "rem-int", false, true),
        (O::AndInt, O::AndInt2addr, "and-int", false, false),
        (O::OrInt, O::OrInt2addr, "or-int", false, false),
        (O::XorInt, O::XorInt2addr, "xor-int", false, false),
        (O::ShlInt, O::ShlInt2addr, "shl-int", false, false),
        (O::ShrInt, O::ShrInt2addr, "shr-int", false, false),
        (O::UshrInt, O::UshrInt2addr, "ushr-int", false, false),
        (O::AddLong, O::AddLong2addr, "add-long", true, false),
        (O::SubLong, O::SubLong2addr, "sub-long", true, false),
        (O::MulLong, O::MulLong2addr, "mul-long", true, false),
        (O::DivLong, O::DivLong2addr, "div-long", true, true),
        (O::RemLong, O::RemLong2addr, "rem-long", true, true),
        (O::AndLong, O::AndLong2addr, "and-long", true, false),
        (O::OrLong, O::OrLong2addr, "or-long", true, false),
        (O::XorLong, O::XorLong2addr, "xor-long", true, false),
        (O::ShlLong, O::ShlLong2addr, "shl-long", true, false),
        (O::ShrLong, O::ShrLong2addr, "shr-long", true, false),
        (O::UshrLong, O::UshrLong2addr, "ushr-long", true, false),
        (O::AddFloat, O::AddFloat2addr, "add-float", false, false),
        (O::SubFloat, O::SubFloat2addr, "sub-float", false, false),
        (O::MulFloat, O::MulFloat2addr, "mul-float", false, false),
        (O::DivFloat, O::DivFloat2addr, "div-float", false, false),
        (O::RemFloat, O::RemFloat2addr, "rem-float", false, false),
        (O::AddDouble, O::AddDouble2addr, "add-double", true, false),
        (O::SubDouble, O::SubDouble2addr, "sub-double", true, false),
        (O::MulDouble, O::MulDouble2addr, "mul-double", true, false),
        (O::DivDouble, O::DivDouble2addr, "div-double", true, false),
        (O::RemDouble, O::RemDouble2addr, "rem-double", true, false),
    ];
    for (i, (op, op2addr, name, is_wide, can_throw)) in binary.into_iter().enumerate() {
        let mut flags = if is_wide { cont | wide } else { cont | reg };
        if can_throw {
            flags |= throw;
        }
        table.push(row(op, name, all_versions(0x90 + i as u16), R::None, Format23x, flags));
        table.push(row(op2addr, NAMES_2ADDR[i], all_versions(0xb0 + i as u16), R::None, Format12x, flags));
    }

    let lit16: [(Opcode, &'static str); 8] = [
        (O::AddIntLit16, "add-int/lit16"), (O::RsubInt, "rsub-int"), (O::MulIntLit16, "mul-int/lit16"),
        (O::DivIntLit16, "div-int/lit16"), (O::RemIntLit16, "rem-int/lit16"),
        (O::AndIntLit16, "and-int/lit16"), (O::OrIntLit16, "or-int/lit16"), (O::XorIntLit16, "xor-int/lit16"),
    ];
    for (i, (op, name)) in lit16.into_iter().enumerate() {
        let flags = if i == 3 || i == 4 { throw | cont | reg } else { cont | reg };
        table.push(row(op, name, all_versions(0xd0 + i as u16), R::None, Format22s, flags));
    }
    let lit8: [(Opcode, &'static str); 11] = [
        (O::AddIntLit8, "add-int/lit8"), (O::RsubIntLit8, "rsub-int/lit8"), (O::MulIntLit8, "mul-int/lit8"),
        (O::DivIntLit8, "div-int/lit8"), (O::RemIntLit8, "rem-int/lit8"), (O::AndIntLit8, "and-int/lit8"),
        (O::OrIntLit8, "or-int/lit8"), (O::XorIntLit8, "xor-int/lit8"), (O::ShlIntLit8, "shl-int/lit8"),
        (O::ShrIntLit8, "shr-int/lit8"), (O::UshrIntLit8, "ushr-int/lit8"),
    ];
    for (i, (op, name)) in lit8.into_iter().enumerate() {
        let flags = if i == 3 || i == 4 { throw | cont | reg } else { cont | reg };
        table.push(row(op, name, all_versions(0xd8 + i as u16), R::None, Format22b, flags));
    }

    let odex_field = odex | throw | cont;
    table.extend([
        row(O::IgetVolatile, "iget-volatile", first_api(0xe3, 9), R::Field, Format22c, odex_field | volatile | reg),
        row(O::IputVolatile, "iput-volatile", first_api(0xe4, 9), R::Field, Format22c, odex_field | volatile),
        row(O::SgetVolatile, "sget-volatile", first_api(0xe5, 9), R::Field, Format21c, odex_field | volatile | stat | reg),
        row(O::SputVolatile, "sput-volatile", first_api(0xe6, 9), R::Field, Format21c, odex_field | volatile | stat),
        row(O::IgetObjectVolatile, "iget-object-volatile", first_api(0xe7, 9), R::Field, Format22c, odex_field | volatile | reg),
        row(O::IgetWideVolatile, "iget-wide-volatile", first_api(0xe8, 9), R::Field, Format22c, odex_field | volatile | wide),
        row(O::IputWideVolatile, "iput-wide-volatile", first_api(0xe9, 9), R::Field, Format22c, odex_field | volatile),
        row(O::SgetWideVolatile, "sget-wide-volatile", first_api(0xea, 9), R::Field, Format21c, odex_field | volatile | stat | wide),
        row(O::SputWideVolatile, "sput-wide-volatile", first_api(0xeb, 9), R::Field, Format21c, odex_field | volatile | stat),
        row(O::ThrowVerificationError, "throw-verification-error", first_api(0xed, 5), R::None, Format20bc, odex | throw),
        row(O::ExecuteInline, "execute-inline", all_apis(0xee), R::None, Format35mi, odex | throw | cont | result),
        row(O::ExecuteInlineRange, "execute-inline/range", first_api(0xef, 8), R::None, Format3rmi, odex | throw | cont | result),
        row(O::InvokeDirectEmpty, "invoke-direct-empty", api_range(0xf0, i32::MIN..=13), R::Method, Format35c, odex | throw | cont | result | init),
        row(O::InvokeObjectInitRange, "invoke-object-init/range", first_api(0xf0, 14), R::Method, Format3rc, odex | throw | cont | result | init),
        row(O::ReturnVoidBarrier, "return-void-barrier", combine(first_api(0xf1, 11), art_range(0x73, i32::MIN..=59)), R::None, Format10x, odex),
        row(O::ReturnVoidNoBarrier, "return-void-no-barrier", art_range(0x73, 60..=i32::MAX), R::None, Format10x, odex),
        row(O::IgetQuick, "iget-quick", combine(all_apis(0xf2), all_art_versions(0xe3)), R::None, Format22cs, odex_field | quick | reg),
        row(O::IgetWideQuick, "iget-wide-quick", combine(all_apis(0xf3), all_art_versions(0xe4)), R::None, Format22cs, odex_field | quick | wide),
        row(O::IgetObjectQuick, "iget-object-quick", combine(all_apis(0xf4), all_art_versions(0xe5)), R::None, Format22cs, odex_field | quick | reg),
        row(O::IputQuick, "iput-quick", combine(all_apis(0xf5), all_art_versions(0xe6)), R::None, Format22cs, odex_field | quick),
        row(O::IputWideQuick, "iput-wide-quick", combine(all_apis(0xf6), all_art_versions(0xe7)), R::None, Format22cs, odex_field | quick),
        row(O::IputObjectQuick, "iput-object-quick", combine(all_apis(0xf7), all_art_versions(0xe8)), R::None, Format22cs, odex_field | quick),
        row(O::InvokeVirtualQuick, "invoke-virtual-quick", combine(all_apis(0xf8), all_art_versions(0xe9)), R::None, Format35ms, odex | throw | cont | result),
        row(O::InvokeVirtualQuickRange, "invoke-virtual-quick/range", combine(all_apis(0xf9), all_art_versions(0xea)), R::None, Format3rms, odex | throw | cont | result),
        row(O::IputBooleanQuick, "iput-boolean-quick", all_art_versions(0xeb), R::None, Format22cs, odex_field | quick),
        row(O::IputByteQuick, "iput-byte-quick", all_art_versions(0xec), R::None, Format22cs, odex_field | quick),
        row(O::IputCharQuick, "iput-char-quick", all_art_versions(0xed), R::None, Format22cs, odex_field | quick),
        row(O::IputShortQuick, "iput-short-quick", all_art_versions(0xee), R::None, Format22cs, odex_field | quick),
        row(O::IgetBooleanQuick, "iget-boolean-quick", all_art_versions(0xef), R::None, Format22cs, odex_field | quick | reg),
        row(O::IgetByteQuick, "iget-byte-quick", all_art_versions(0xf0), R::None, Format22cs, odex_field | quick | reg),
        row(O::IgetCharQuick, "iget-char-quick", all_art_versions(0xf1), R::None, Format22cs, odex_field | quick | reg),
        row(O::IgetShortQuick, "iget-short-quick", all_art_versions(0xf2), R::None, Format22cs, odex_field | quick | reg),
        row(O::InvokeSuperQuick, "invoke-super-quick", api_range(0xfa, i32::MIN..=25), R::None, Format35ms, odex | throw | cont | result),
        row(O::InvokeSuperQuickRange, "invoke-super-quick/range", api_range(0xfb, i32::MIN..=25), R::None, Format3rms, odex | throw | cont | result),
        row(O::IputObjectVolatile, "iput-object-volatile", first_api(0xfc, 9), R::Field, Format22c, odex_field | volatile),
        row(O::SgetObjectVolatile, "sget-object-volatile", first_api(0xfd, 9), R::Field, Format21c, odex_field | volatile | stat | reg),
        row(O::SputObjectVolatile, "sput-object-volatile", api_range(0xfe, 9..=19), R::Field, Format21c, odex_field | volatile | stat),
        row(O::InvokePolymorphic, "invoke-polymorphic", art_range(0xfa, 87..=i32::MAX), R::Method, Format45cc, throw | cont | result),
        row(O::InvokePolymorphicRange, "invoke-polymorphic/range", art_range(0xfb, 87..=i32::MAX), R::Method, Format4rcc, throw | cont | result),
        row(O::InvokeCustom, "invoke-custom", art_range(0xfc, 111..=i32::MAX), R::CallSite, Format35c, throw | cont | result),
        row(O::InvokeCustomRange, "invoke-custom/range", art_range(0xfd, 111..=i32::MAX), R::CallSite, Format3rc, throw | cont | result),
        row(O::ConstMethodHandle, "const-method-handle", art_range(0xfe, 134..=i32::MAX), R::MethodHandle, Format21c, throw | cont | reg),
        row(O::ConstMethodType, "const-method-type", art_range(0xff, 134..=i32::MAX), R::MethodProto, Format21c, throw | cont | reg),
        row(O::PackedSwitchPayload, "packed-switch-payload", all_versions(0x100), R::None, PackedSwitchPayload, none),
        row(O::SparseSwitchPayload, "sparse-switch-payload", all_versions(0x200), R::None, SparseSwitchPayload, none),
        row(O::ArrayPayload, "array-payload", all_versions(0x300), R::None, ArrayPayload, none),
    ]);
    table
});

const NAMES_2ADDR: [&str; 32] = [
    "add-int/2addr", "sub-int/2addr", "mul-int/2addr", "div-int/2addr", "rem-int/2addr",
    "and-int/2addr", "or-int/2addr", "xor-int/2addr", "shl-int/2addr", "shr-int/2addr",
    "ushr-int/2addr", "add-long/2addr", "sub-long/2addr", "mul-long/2addr", "div-long/2addr",
    "rem-long/2addr", "and-long/2addr", "or-long/2addr", "xor-long/2addr", "shl-long/2addr",
    "shr-long/2addr", "ushr-long/2addr", "add-float/2addr", "sub-float/2addr", "mul-float/2addr",
    "div-float/2addr", "rem-float/2addr", "add-double/2addr", "sub-double/2addr",
    "mul-double/2addr", "div-double/2addr", "rem-double/2addr",
];

static OPCODE_INDEX: Lazy<HashMap<Opcode, usize>> =
    Lazy::new(|| OPCODES.iter().enumerate().map(|(i, info)| (info.opcode, i)).collect());

static OPCODE_BY_NAME: Lazy<HashMap<&'static str, Opcode>> =
    Lazy::new(|| OPCODES.iter().map(|info| (info.name, info.opcode)).collect());

impl Opcode {
    pub fn info(&self) -> &'static OpcodeInfo {
        // every variant has exactly one row in OPCODES
        &OPCODES[OPCODE_INDEX[self]]
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        OPCODE_BY_NAME.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn format(&self) -> Format {
        self.info().format
    }

    pub fn reference_type(&self) -> ReferenceType {
        self.info().reference_type
    }

    pub fn flags(&self) -> OpcodeFlags {
        self.info().flags
    }

    pub fn can_throw(&self) -> bool {
        self.flags().contains(OpcodeFlags::CAN_THROW)
    }

    pub fn odex_only(&self) -> bool {
        self.flags().contains(OpcodeFlags::ODEX_ONLY)
    }

    pub fn can_continue(&self) -> bool {
        self.flags().contains(OpcodeFlags::CAN_CONTINUE)
    }

    pub fn sets_result(&self) -> bool {
        self.flags().contains(OpcodeFlags::SETS_RESULT)
    }

    pub fn sets_register(&self) -> bool {
        self.flags().contains(OpcodeFlags::SETS_REGISTER)
    }

    pub fn sets_wide_register(&self) -> bool {
        self.flags().contains(OpcodeFlags::SETS_WIDE_REGISTER)
    }

    pub fn is_quick_field_accessor(&self) -> bool {
        self.flags().contains(OpcodeFlags::QUICK_FIELD_ACCESSOR)
    }

    pub fn is_volatile_field_accessor(&self) -> bool {
        self.flags().contains(OpcodeFlags::VOLATILE_FIELD_ACCESSOR)
    }

    pub fn is_static_field_accessor(&self) -> bool {
        self.flags().contains(OpcodeFlags::STATIC_FIELD_ACCESSOR)
    }

    pub fn can_initialize_reference(&self) -> bool {
        self.flags().contains(OpcodeFlags::CAN_INITIALIZE_REFERENCE)
    }

    pub fn is_goto(&self) -> bool {
        matches!(self, Opcode::Goto | Opcode::Goto16 | Opcode::Goto32)
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Opcode::PackedSwitch | Opcode::SparseSwitch)
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.format(), Format::Format21t | Format::Format22t)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

static API_TO_ART_VERSION: Lazy<RangeInclusiveMap<i32, i32>> = Lazy::new(|| {
    let mut map = RangeInclusiveMap::new();
    map.insert(21..=21, 39);
    map.insert(22..=22, 45);
    map.insert(23..=23, 64);
    map.insert(24..=24, 79);
    map.insert(25..=25, 88);
    map.insert(26..=26, 124);
    map.insert(27..=27, 131);
    map.insert(28..=28, 138);
    map.insert(29..=i32::MAX, 170);
    map
});

/// ART version shipped with a given API level, or `NO_VERSION` for Dalvik releases.
pub fn art_version_for_api(api: i32) -> i32 {
    API_TO_ART_VERSION.get(&api).copied().unwrap_or(NO_VERSION)
}

/// Version specific mapping between raw opcode values and `Opcode`.
pub struct Opcodes {
    pub api: i32,
    pub art_version: i32,
    by_value: HashMap<u16, Opcode>,
    values: HashMap<Opcode, u16>,
}

type OpcodesCache = Mutex<HashMap<(i32, i32), Arc<Opcodes>>>;

static OPCODES_CACHE: Lazy<OpcodesCache> = Lazy::new(|| Mutex::new(HashMap::new()));

impl Opcodes {
    pub fn new(api: i32, art_version: i32) -> Arc<Opcodes> {
        let art_version = if art_version == NO_VERSION { art_version_for_api(api) } else { art_version };
        let key = (api, art_version);
        if let Ok(cache) = OPCODES_CACHE.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let mut by_value = HashMap::new();
        let mut values = HashMap::new();
        for info in OPCODES.iter() {
            if let Some(value) = info.value_for(api, art_version) {
                by_value.insert(value, info.opcode);
                values.insert(info.opcode, value);
            }
        }
        let opcodes = Arc::new(Opcodes { api, art_version, by_value, values });
        if let Ok(mut cache) = OPCODES_CACHE.lock() {
            cache.insert(key, opcodes.clone());
        }
        opcodes
    }

    pub fn for_api(api: i32) -> Arc<Opcodes> {
        Opcodes::new(api, NO_VERSION)
    }

    pub fn is_art(&self) -> bool {
        self.art_version != NO_VERSION
    }

    pub fn opcode_for_value(&self, value: u16) -> Option<Opcode> {
        self.by_value.get(&value).copied()
    }

    pub fn value_for(&self, opcode: Opcode) -> Option<u16> {
        self.values.get(&opcode).copied()
    }
}
