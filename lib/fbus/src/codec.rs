use crate::types::{DataType, DATA_SPACE, TERMINATOR};
use byteorder::{ByteOrder, LittleEndian};
use flint::value::Value;

/// Width of the value block carried by analog register frames. Values
/// narrower than the block are little-endian, zero padded.
pub const VALUE_BLOCK_SIZE: usize = 4;

/// Boolean true as transmitted in two-byte digital payloads (high/low).
pub const DIGITAL_TRUE: u16 = 0xFF00;

/// Reads an ASCII text field starting at `offset`, terminated by the first
/// data space or frame terminator. Bytes past the end of the payload simply
/// end the field.
pub fn extract_text(payload: &[u8], offset: usize) -> String {
    let mut text = String::new();

    for &byte in payload.iter().skip(offset) {
        if byte == DATA_SPACE || byte == TERMINATOR {
            break;
        }

        text.push(char::from(byte));
    }

    text
}

/// Position of the next data space at or after `offset`.
pub fn find_space(payload: &[u8], offset: usize) -> Option<usize> {
    payload
        .iter()
        .skip(offset)
        .position(|&byte| byte == DATA_SPACE)
        .map(|position| position + offset)
}

/// Reads a big-endian u16 out of the payload (addresses and lengths).
#[inline]
pub fn read_u16_be(payload: &[u8], offset: usize) -> u16 {
    (u16::from(payload[offset]) << 8) | u16::from(payload[offset + 1])
}

/// Appends a big-endian u16 (addresses and lengths).
#[inline]
pub fn push_u16_be(frame: &mut Vec<u8>, value: u16) {
    frame.push((value >> 8) as u8);
    frame.push((value & 0xFF) as u8);
}

/// Encodes a typed value into the four-byte little-endian block used by
/// analog register frames. Returns `None` for data types that have no wire
/// representation (Unknown, calendar types) or when the value class does not
/// match the register's data type.
pub fn encode_value(data_type: DataType, value: Value) -> Option<[u8; VALUE_BLOCK_SIZE]> {
    let mut block = [0u8; VALUE_BLOCK_SIZE];

    match data_type {
        DataType::Float32 => match value {
            Value::Float(inner) => LittleEndian::write_f32(&mut block, inner),
            _ => return None,
        },
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => match value {
            Value::Unsigned(inner) => LittleEndian::write_u32(&mut block, inner),
            _ => return None,
        },
        DataType::Int8 | DataType::Int16 | DataType::Int32 => match value {
            Value::Signed(inner) => LittleEndian::write_i32(&mut block, inner),
            _ => return None,
        },
        _ => return None,
    }

    Some(block)
}

/// Decodes a value block per the register's data type. The block is
/// little-endian; only the first `data_type.size()` bytes are significant.
pub fn decode_value(data_type: DataType, block: &[u8]) -> Option<Value> {
    if block.len() < VALUE_BLOCK_SIZE {
        return None;
    }

    Some(match data_type {
        DataType::Float32 => Value::Float(LittleEndian::read_f32(block)),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => {
            Value::Unsigned(LittleEndian::read_u32(block))
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 => {
            Value::Signed(LittleEndian::read_i32(block))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_terminator() {
        let payload = [0x01, b'A', b'B', b'C', TERMINATOR, b'X'];

        assert_eq!(extract_text(&payload, 1), "ABC");
    }

    #[test]
    fn test_extract_text_space() {
        let payload = [b'o', b'n', b'e', DATA_SPACE, b't', b'w', b'o', TERMINATOR];

        assert_eq!(extract_text(&payload, 0), "one");
        assert_eq!(extract_text(&payload, 4), "two");
    }

    #[test]
    fn test_extract_text_runs_off_end() {
        let payload = [b'a', b'b'];

        assert_eq!(extract_text(&payload, 0), "ab");
        assert_eq!(extract_text(&payload, 5), "");
    }

    #[test]
    fn test_find_space() {
        let payload = [b'a', DATA_SPACE, b'b', DATA_SPACE, b'c'];

        assert_eq!(find_space(&payload, 0), Some(1));
        assert_eq!(find_space(&payload, 2), Some(3));
        assert_eq!(find_space(&payload, 4), None);
    }

    #[test]
    fn test_u16_be_roundtrip() {
        let mut frame = Vec::new();
        push_u16_be(&mut frame, 0x1234);

        assert_eq!(frame, vec![0x12, 0x34]);
        assert_eq!(read_u16_be(&frame, 0), 0x1234);
    }

    #[test]
    fn test_encode_float() {
        let block = encode_value(DataType::Float32, Value::Float(12.5)).unwrap();

        // IEEE-754 single precision 12.5 = 0x41480000, little-endian
        assert_eq!(block, [0x00, 0x00, 0x48, 0x41]);
    }

    #[test]
    fn test_encode_unknown_is_none() {
        assert_eq!(encode_value(DataType::Unknown, Value::Unsigned(1)), None);
        assert_eq!(decode_value(DataType::Unknown, &[0, 0, 0, 0]), None);
    }

    #[test]
    fn test_encode_class_mismatch_is_none() {
        assert_eq!(encode_value(DataType::Float32, Value::Unsigned(1)), None);
        assert_eq!(encode_value(DataType::UInt16, Value::Float(1.0)), None);
    }

    #[test]
    fn test_value_roundtrip() {
        let cases = [
            (DataType::UInt8, Value::Unsigned(200)),
            (DataType::UInt16, Value::Unsigned(40_000)),
            (DataType::UInt32, Value::Unsigned(3_000_000_000)),
            (DataType::Int8, Value::Signed(-100)),
            (DataType::Int16, Value::Signed(-30_000)),
            (DataType::Int32, Value::Signed(-2_000_000_000)),
            (DataType::Float32, Value::Float(-0.25)),
        ];

        for &(data_type, value) in cases.iter() {
            let block = encode_value(data_type, value).unwrap();
            assert_eq!(decode_value(data_type, &block), Some(value));

            // Narrow types only occupy their natural width, the rest of the
            // block is padding.
            for &byte in block.iter().skip(data_type.size()) {
                if let Value::Unsigned(_) = value {
                    assert_eq!(byte, 0);
                }
            }
        }
    }

    #[test]
    fn test_decode_short_block_is_none() {
        assert_eq!(decode_value(DataType::UInt16, &[0x01, 0x02]), None);
    }
}
