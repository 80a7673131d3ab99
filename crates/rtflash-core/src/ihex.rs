//! Intel HEX image loading
//!
//! Line-oriented parser for the subset the EEPROM images use: data records
//! (type 0) and end-of-file (type 1). The 16-bit record addresses wrap once
//! per 64 KiB bank; a record whose address restarts below the previous one
//! advances the bank, which is how a 256 KiB image fits the record format.
//!
//! The loader first attempts HEX parsing and falls back to a raw binary
//! read of exactly the EEPROM size.

use crate::error::{Error, Result};
use crate::image::{EepromImage, BANK_SIZE, EEPROM_SIZE};
use std::io::Read;
use std::path::Path;

/// Record type: data
const REC_DATA: u8 = 0;
/// Record type: end of file
const REC_EOF: u8 = 1;

/// Parse Intel HEX text into a fresh image
pub fn parse_hex(text: &str) -> Result<EepromImage> {
    let mut image = EepromImage::new();
    let mut bank = 0usize;
    let mut last_addr: Option<u32> = None;

    for (line_idx, raw_line) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let record = parse_line(line, line_no)?;
        match record.kind {
            REC_EOF => return Ok(image),
            REC_DATA => {
                let addr = record.address;
                if let Some(prev) = last_addr {
                    if addr < prev {
                        bank += 1;
                    }
                }
                last_addr = Some(addr);

                let base = bank * BANK_SIZE + addr as usize;
                if base + record.data.len() > EEPROM_SIZE {
                    return Err(Error::HexParse {
                        line: line_no,
                        position: 4,
                    });
                }
                image.as_mut_slice()[base..base + record.data.len()]
                    .copy_from_slice(&record.data);
            }
            _ => unreachable!("parse_line admits only data and eof records"),
        }
    }

    // Ran out of lines without an end-of-file record
    Err(Error::HexParse {
        line: text.lines().count() + 1,
        position: 1,
    })
}

struct Record {
    address: u32,
    kind: u8,
    data: Vec<u8>,
}

/// Parse one record. `position` in errors is the 1-based byte column.
fn parse_line(line: &str, line_no: usize) -> Result<Record> {
    let err = |position: usize| Error::HexParse {
        line: line_no,
        position,
    };

    let bytes = line.as_bytes();
    if bytes[0] != b':' {
        return Err(err(1));
    }
    // shortest legal record: colon + len + addr + type + checksum
    if bytes.len() < 11 {
        return Err(err(bytes.len()));
    }

    let len = hex_u8(bytes, 1, line_no)? as usize;
    if bytes.len() < 11 + len * 2 {
        return Err(err(bytes.len()));
    }

    let addr_hi = hex_u8(bytes, 3, line_no)?;
    let addr_lo = hex_u8(bytes, 5, line_no)?;
    let address = ((addr_hi as u32) << 8) | addr_lo as u32;
    let kind = hex_u8(bytes, 7, line_no)?;
    if kind != REC_DATA && kind != REC_EOF {
        return Err(err(8));
    }

    let mut sum = (len as u8)
        .wrapping_add(addr_hi)
        .wrapping_add(addr_lo)
        .wrapping_add(kind);
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        let b = hex_u8(bytes, 9 + i * 2, line_no)?;
        sum = sum.wrapping_add(b);
        data.push(b);
    }

    let checksum = hex_u8(bytes, 9 + len * 2, line_no)?;
    if sum.wrapping_add(checksum) != 0 {
        return Err(err(9 + len * 2 + 1));
    }

    Ok(Record {
        address,
        kind,
        data,
    })
}

/// Decode two hex digits at byte offset `at` (0-based into the line)
fn hex_u8(bytes: &[u8], at: usize, line_no: usize) -> Result<u8> {
    let digit = |i: usize| -> Result<u8> {
        let c = *bytes.get(i).ok_or(Error::HexParse {
            line: line_no,
            position: i + 1,
        })?;
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(Error::HexParse {
                line: line_no,
                position: i + 1,
            }),
        }
    };
    Ok((digit(at)? << 4) | digit(at + 1)?)
}

/// Emit a full image as Intel HEX text: 16-byte data records with addresses
/// wrapping per bank, then the end-of-file record.
pub fn emit_hex(image: &EepromImage) -> String {
    let mut out = String::with_capacity(EEPROM_SIZE / 16 * 44);
    for (chunk_idx, chunk) in image.as_slice().chunks(16).enumerate() {
        let addr = (chunk_idx * 16 % BANK_SIZE) as u16;
        emit_record(&mut out, addr, REC_DATA, chunk);
    }
    emit_record(&mut out, 0, REC_EOF, &[]);
    out
}

fn emit_record(out: &mut String, addr: u16, kind: u8, data: &[u8]) {
    use std::fmt::Write;
    let mut sum = (data.len() as u8)
        .wrapping_add((addr >> 8) as u8)
        .wrapping_add(addr as u8)
        .wrapping_add(kind);
    write!(out, ":{:02X}{:04X}{:02X}", data.len(), addr, kind).unwrap();
    for &b in data {
        write!(out, "{:02X}", b).unwrap();
        sum = sum.wrapping_add(b);
    }
    write!(out, "{:02X}\n", sum.wrapping_neg()).unwrap();
}

/// Load an image file: Intel HEX first, then raw binary of exactly the
/// EEPROM size.
pub fn load_image(path: &Path) -> Result<EepromImage> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| Error::Io(e.raw_os_error().unwrap_or(0)))?;

    if let Ok(text) = std::str::from_utf8(&bytes) {
        match parse_hex(text) {
            Ok(image) => return Ok(image),
            Err(e) => {
                log::info!("not a HEX image ({}), trying raw binary", e);
            }
        }
    }

    if bytes.len() < EEPROM_SIZE {
        return Err(Error::BinaryReadUnderflow { got: bytes.len() });
    }
    log::info!("read {} bytes from binary image", bytes.len());
    EepromImage::from_bytes(&bytes)
}
