//! Parsing and classification of JNI style type descriptors (`I`, `[J`,
//! `Ljava/lang/String;`) and method prototypes (`(IJ)V`).

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::is_not;
use nom::character::complete::{char, one_of};
use nom::combinator::{all_consuming, recognize};
use nom::multi::{many0, many0_count};
use nom::sequence::{delimited, pair};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::dex::error::DexError;

pub const OBJECT: &str = "Ljava/lang/Object;";
pub const STRING: &str = "Ljava/lang/String;";
pub const CLASS: &str = "Ljava/lang/Class;";
pub const THROWABLE: &str = "Ljava/lang/Throwable;";
pub const CLONEABLE: &str = "Ljava/lang/Cloneable;";
pub const SERIALIZABLE: &str = "Ljava/io/Serializable;";
pub const METHOD_HANDLE: &str = "Ljava/lang/invoke/MethodHandle;";
pub const METHOD_TYPE: &str = "Ljava/lang/invoke/MethodType;";

fn class_descriptor(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('L'), is_not(";"), char(';')))(input)
}

fn primitive_descriptor(input: &str) -> IResult<&str, &str> {
    recognize(one_of("ZBSCIJFD"))(input)
}

pub(crate) fn field_type(input: &str) -> IResult<&str, &str> {
    recognize(pair(many0_count(char('[')), alt((primitive_descriptor, class_descriptor))))(input)
}

fn return_type(input: &str) -> IResult<&str, &str> {
    alt((recognize(char('V')), field_type))(input)
}

fn method_proto(input: &str) -> IResult<&str, (Vec<&str>, &str)> {
    pair(delimited(char('('), many0(field_type), char(')')), return_type)(input)
}

/// Validates a complete field type descriptor.
pub fn parse_field_type(input: &str) -> Result<&str, DexError> {
    match all_consuming(field_type)(input) {
        Ok((_, desc)) => Ok(desc),
        Err(_) => fail!("Invalid type descriptor {}", input),
    }
}

/// A method prototype: parameter descriptors and a return descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodProto {
    pub params: Vec<String>,
    pub return_type: String,
}

impl MethodProto {
    pub fn new(params: &[&str], return_type: &str) -> Self {
        MethodProto {
            params: params.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, DexError> {
        match all_consuming(method_proto)(input) {
            Ok((_, (params, ret))) => Ok(MethodProto {
                params: params.into_iter().map(String::from).collect(),
                return_type: ret.to_string(),
            }),
            Err(_) => fail!("Invalid method prototype {}", input),
        }
    }

    /// Number of registers the parameters occupy, not counting `this`.
    pub fn parameter_register_count(&self) -> u16 {
        self.params.iter().map(|p| register_width(p)).sum()
    }
}

impl fmt::Display for MethodProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for p in &self.params {
            write!(f, "{}", p)?;
        }
        write!(f, "){}", self.return_type)
    }
}

pub fn is_primitive(desc: &str) -> bool {
    desc.len() == 1 && "ZBSCIJFD".contains(desc)
}

pub fn is_reference(desc: &str) -> bool {
    desc.starts_with('L') || desc.starts_with('[')
}

pub fn is_array(desc: &str) -> bool {
    desc.starts_with('[')
}

pub fn is_wide(desc: &str) -> bool {
    desc == "J" || desc == "D"
}

pub fn array_dimensions(desc: &str) -> usize {
    desc.chars().take_while(|c| *c == '[').count()
}

/// `[[I` -> `[I`; non-array descriptors are returned unchanged.
pub fn component_type(desc: &str) -> &str {
    desc.strip_prefix('[').unwrap_or(desc)
}

/// `[[Lfoo;` -> `Lfoo;`
pub fn element_type(desc: &str) -> &str {
    &desc[array_dimensions(desc)..]
}

pub fn register_width(desc: &str) -> u16 {
    match desc {
        "V" => 0,
        "J" | "D" => 2,
        _ => 1,
    }
}

/// Package part of a class descriptor, `Lfoo/bar/Baz;` -> `Lfoo/bar`.
/// Array descriptors report the package of their element type.
pub fn package_of(desc: &str) -> &str {
    let element = element_type(desc);
    match element.rfind('/') {
        Some(ix) => &element[..ix],
        None => "L",
    }
}

pub fn same_package(a: &str, b: &str) -> bool {
    package_of(a) == package_of(b)
}
