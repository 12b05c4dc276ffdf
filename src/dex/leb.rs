use crate::dex::error::DexError;

pub fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if remaining == 0 {
            break;
        }
    }

    result
}

/// Decodes a 32-bit ULEB128 value, returning the value and the number of
/// bytes consumed. Encodings longer than five bytes are cut off at the fifth
/// byte; a stream that ends while the continuation bit is set is an error.
pub fn decode_uleb128(encoded: &[u8]) -> Result<(u32, usize), DexError> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().enumerate() {
        let low = (byte & 0x7F) as u32;
        if shift < 32 {
            value = value.wrapping_add(low.wrapping_shl(shift));
        }
        shift = shift.saturating_add(7);

        if byte & 0x80 == 0 || count == 4 {
            return Ok((value, count + 1));
        }
    }

    fail!("Unterminated uleb128 value after {} bytes", encoded.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x01], 128, 2),
            (vec![0xE5, 0x8E, 0x26, 0xFF], 624485, 3),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX, 5),
        ];

        for (encoded, expected, size) in cases {
            let (v, c) = decode_uleb128(&encoded).expect("decode uleb128");
            assert_eq!(v, expected);
            assert_eq!(c, size);
        }
    }

    #[test]
    fn truncated_uleb128_is_an_error() {
        assert!(decode_uleb128(&[0x80, 0x80]).is_err());
        assert!(decode_uleb128(&[]).is_err());
    }
}
