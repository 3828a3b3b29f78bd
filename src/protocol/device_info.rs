//! Decoding of device information attribute values.

use crate::data::InfoField;
use crate::error::{Error, Result};

/// Decode the raw value of a device information attribute.
///
/// The system id is binary and rendered as colon-separated hex with the
/// most significant byte first. Every other field is a UTF-8 string,
/// possibly NUL-terminated.
pub fn decode_info_value(field: InfoField, data: &[u8]) -> Result<String> {
    match field {
        InfoField::SystemId => format_system_id(data),
        _ => {
            let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
            String::from_utf8(data[..end].to_vec()).map_err(|_| Error::InvalidData {
                context: format!("Invalid UTF-8 in {}", field),
            })
        }
    }
}

/// Format an 8-byte system id (stored little-endian).
fn format_system_id(data: &[u8]) -> Result<String> {
    if data.len() != 8 {
        return Err(Error::InvalidData {
            context: format!("System id must be 8 bytes, got {}", data.len()),
        });
    }

    Ok(data
        .iter()
        .rev()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":"))
}
