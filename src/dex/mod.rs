#[macro_use]
pub mod error;

pub mod access;
pub mod class_def;
pub mod descriptor;
pub mod instruction;
pub mod leb;
pub mod opcodes;
pub mod partition;

use crate::dex::error::DexError;
use crate::dex::leb::{decode_uleb128, encode_uleb128};

// Little-endian cursor reads over raw table bytes
pub fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = u16::from_le_bytes([bytes[*ix], bytes[*ix + 1]]);
    *ix += 2;
    Ok(result)
}

pub fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if *ix > bytes.len()
    {
        fail!("Unexpected end of stream reading uleb128 at index {}", *ix);
    }
    let (val, size) = decode_uleb128(&bytes[*ix..]).map_err(|e| err!(e, "index {}", *ix))?;
    *ix += size;
    Ok(val)
}

pub fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

pub fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}
