//! Tables behind `execute-inline`: the odex optimizer replaces calls to a
//! fixed set of intrinsics by an index into the VM's inline method table.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::{space0, space1};
use nom::combinator::{all_consuming, map, opt, rest};
use nom::sequence::{terminated, tuple};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::dex::class_def::MethodRef;
use crate::dex::descriptor::MethodProto;
use crate::dex::error::DexError;
use crate::dex::opcodes::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineKind {
    Static,
    Virtual,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineMethod {
    pub method: MethodRef,
    pub kind: InlineKind,
}

impl InlineMethod {
    /// Standard invoke opcode replacing execute-inline(/range).
    pub fn invoke_opcode(&self, range: bool) -> Opcode {
        match (self.kind, range) {
            (InlineKind::Static, false) => Opcode::InvokeStatic,
            (InlineKind::Static, true) => Opcode::InvokeStaticRange,
            (InlineKind::Virtual, false) => Opcode::InvokeVirtual,
            (InlineKind::Virtual, true) => Opcode::InvokeVirtualRange,
            (InlineKind::Direct, false) => Opcode::InvokeDirect,
            (InlineKind::Direct, true) => Opcode::InvokeDirectRange,
        }
    }
}

const STRING: &str = "Ljava/lang/String;";
const MATH: &str = "Ljava/lang/Math;";
const STRICT_MATH: &str = "Ljava/lang/StrictMath;";
const FLOAT: &str = "Ljava/lang/Float;";
const DOUBLE: &str = "Ljava/lang/Double;";
const TEST_TARGET: &str = "Lorg/apache/harmony/dalvik/NativeTestTarget;";

type Row = (InlineKind, &'static str, &'static str, &'static [&'static str], &'static str);

const MATH_ROWS: &[Row] = &[
    (InlineKind::Static, MATH, "abs", &["I"], "I"),
    (InlineKind::Static, MATH, "abs", &["J"], "J"),
    (InlineKind::Static, MATH, "abs", &["F"], "F"),
    (InlineKind::Static, MATH, "abs", &["D"], "D"),
    (InlineKind::Static, MATH, "min", &["I", "I"], "I"),
    (InlineKind::Static, MATH, "max", &["I", "I"], "I"),
    (InlineKind::Static, MATH, "sqrt", &["D"], "D"),
    (InlineKind::Static, MATH, "cos", &["D"], "D"),
    (InlineKind::Static, MATH, "sin", &["D"], "D"),
];

const VERSION_35_STRING_ROWS: &[Row] = &[
    (InlineKind::Static, TEST_TARGET, "emptyInlineMethod", &[], "V"),
    (InlineKind::Virtual, STRING, "charAt", &["I"], "C"),
    (InlineKind::Virtual, STRING, "compareTo", &[STRING], "I"),
    (InlineKind::Virtual, STRING, "equals", &["Ljava/lang/Object;"], "Z"),
    (InlineKind::Virtual, STRING, "length", &[], "I"),
];

const VERSION_36_STRING_ROWS: &[Row] = &[
    (InlineKind::Static, TEST_TARGET, "emptyInlineMethod", &[], "V"),
    (InlineKind::Virtual, STRING, "charAt", &["I"], "C"),
    (InlineKind::Virtual, STRING, "compareTo", &[STRING], "I"),
    (InlineKind::Virtual, STRING, "equals", &["Ljava/lang/Object;"], "Z"),
    (InlineKind::Direct, STRING, "fastIndexOf", &["I", "I"], "I"),
    (InlineKind::Virtual, STRING, "isEmpty", &[], "Z"),
    (InlineKind::Virtual, STRING, "length", &[], "I"),
];

const VERSION_36_TAIL_ROWS: &[Row] = &[
    (InlineKind::Static, FLOAT, "floatToIntBits", &["F"], "I"),
    (InlineKind::Static, FLOAT, "floatToRawIntBits", &["F"], "I"),
    (InlineKind::Static, FLOAT, "intBitsToFloat", &["I"], "F"),
    (InlineKind::Static, DOUBLE, "doubleToLongBits", &["D"], "J"),
    (InlineKind::Static, DOUBLE, "doubleToRawLongBits", &["D"], "J"),
    (InlineKind::Static, DOUBLE, "longBitsToDouble", &["J"], "D"),
    (InlineKind::Static, STRICT_MATH, "abs", &["I"], "I"),
    (InlineKind::Static, STRICT_MATH, "abs", &["J"], "J"),
    (InlineKind::Static, STRICT_MATH, "abs", &["F"], "F"),
    (InlineKind::Static, STRICT_MATH, "abs", &["D"], "D"),
    (InlineKind::Static, STRICT_MATH, "min", &["I", "I"], "I"),
    (InlineKind::Static, STRICT_MATH, "max", &["I", "I"], "I"),
    (InlineKind::Static, STRICT_MATH, "sqrt", &["D"], "D"),
];

fn inline_method(row: &Row) -> InlineMethod {
    let (kind, class, name, params, ret) = *row;
    InlineMethod { method: MethodRef::new(class, name, MethodProto::new(params, ret)), kind }
}

/// Maps execute-inline indices to the methods they stand for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineMethodResolver {
    methods: Vec<InlineMethod>,
}

impl InlineMethodResolver {
    /// Built-in table of the given odex version; 35 covers the oldest
    /// releases, everything later uses 36.
    pub fn for_version(odex_version: u32) -> Self {
        let rows: Vec<&Row> = if odex_version <= 35 {
            VERSION_35_STRING_ROWS.iter().chain(MATH_ROWS).collect()
        } else {
            VERSION_36_STRING_ROWS.iter().chain(MATH_ROWS).chain(VERSION_36_TAIL_ROWS).collect()
        };
        InlineMethodResolver { methods: rows.into_iter().map(inline_method).collect() }
    }

    /// Parses a custom table, one method per line, optionally prefixed with
    /// `static`, `virtual` or `direct` (default virtual):
    ///
    /// ```text
    /// static Ljava/lang/Math;->abs(I)I
    /// Ljava/lang/String;->length()I
    /// ```
    pub fn parse(text: &str) -> Result<Self, DexError> {
        let mut methods = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (kind, class, name, proto) = match all_consuming(inline_line)(line) {
                Ok((_, parsed)) => parsed,
                Err(_) => fail!("Malformed inline method entry on line {}: {}", line_no + 1, line),
            };
            let method = MethodRef::parse(class, name, proto).map_err(|e| err!(e, "line {}", line_no + 1))?;
            methods.push(InlineMethod { method, kind: kind.unwrap_or(InlineKind::Virtual) });
        }
        Ok(InlineMethodResolver { methods })
    }

    pub fn resolve(&self, index: u32) -> Option<&InlineMethod> {
        self.methods.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

fn inline_kind(input: &str) -> IResult<&str, InlineKind> {
    terminated(
        alt((
            map(tag("static"), |_| InlineKind::Static),
            map(tag("virtual"), |_| InlineKind::Virtual),
            map(tag("direct"), |_| InlineKind::Direct),
        )),
        space1,
    )(input)
}

fn inline_line(input: &str) -> IResult<&str, (Option<InlineKind>, &str, &str, &str)> {
    let (input, (kind, _, class, _, name, proto)) = tuple((
        opt(inline_kind),
        space0,
        take_until("->"),
        tag("->"),
        take_until("("),
        rest,
    ))(input)?;
    Ok((input, (kind, class, name, proto)))
}
