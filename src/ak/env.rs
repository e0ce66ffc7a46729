use std::io::Cursor;
use std::str;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{trace, warn};
use thiserror::Error;

/// Name prefix that identifies bootloader environment partitions.
pub const NAME_PREFIX: &str = "ENV";

/// Environment decoding errors
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("The environment partition is too small to contain its checksum header")]
    TruncatedHeader,

    #[error("Environment entry {:?} is not valid UTF-8: {}", _0, _1)]
    InvalidEncoding(String, str::Utf8Error),
}

/// Calculates the crc32 checksum for the given slice of `bytes`
///
/// The crc32 is implemented with the polynomial 0xEDB88320 and the initial value of 0xFFFFFFFF
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;

    for byte in bytes {
        crc ^= *byte as u32;

        for _ in 0..8 {
            if crc & 1 > 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Decodes the content of an environment partition into newline-joined
/// `key=value` text.
///
/// The partition starts with a 4-byte crc32 checksum over the rest of the
/// content, followed by null-delimited text lines and null padding up to the
/// partition size. A checksum mismatch is logged but does not stop the
/// decoding.
pub fn decode(data: &[u8]) -> Result<String, EnvError> {
    let mut cursor = Cursor::new(data);

    // Read the checksum header
    let stored_crc = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| EnvError::TruncatedHeader)?;

    let content = &data[4..];
    let calculated_crc = crc32(content);

    if calculated_crc != stored_crc {
        warn!(
            "Environment checksum mismatch: stored {:#010x}, calculated {:#010x}",
            stored_crc, calculated_crc
        );
    }

    // Strip the null padding at the end, then split the remainder into
    // null-delimited lines
    let padding = content.iter().rev().take_while(|&&byte| byte == 0).count();
    let lines: Vec<&str> = content[..content.len() - padding]
        .split(|&byte| byte == 0)
        .map(|line| {
            str::from_utf8(line).map_err(|err| {
                EnvError::InvalidEncoding(String::from_utf8_lossy(line).into_owned(), err)
            })
        })
        .collect::<Result<_, _>>()?;

    trace!("Decoded {} environment entries", lines.len());

    Ok(lines.join("\n"))
}
