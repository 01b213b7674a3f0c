//! DFU package parser for Nordic firmware updates.
//!
//! An Adafruit nrfutil DFU package is a zip archive containing:
//! - `manifest.json` - Package metadata (ignored here)
//! - `*.dat` - Init packet (protobuf-encoded, validated by the bootloader)
//! - `*.bin` - Application binary

use std::io::{Cursor, Read};

use crate::error::{OtaError, OtaResult};

/// Contents of a parsed DFU package.
#[derive(Debug)]
pub struct DfuPackage {
    /// Init packet data (`.dat` contents).
    pub init_packet: Vec<u8>,
    /// Firmware binary data (`.bin` contents).
    pub firmware: Vec<u8>,
}

/// Parse a DFU package from raw zip bytes.
///
/// Entries are matched by extension: `.dat` is the init packet, `.bin` the
/// firmware. If the archive holds more than one entry of either kind, the
/// last one in enumeration order wins; well-formed packages contain exactly
/// one of each, so callers should not rely on that tolerance. The init
/// packet's internal structure is not inspected - the bootloader validates
/// it during `EXECUTE`.
///
/// # Errors
/// Fails with [`OtaError::MissingPackageEntry`] if either required entry is
/// absent, or [`OtaError::Zip`] if the bytes are not a readable archive.
pub fn parse_dfu_package(zip_data: &[u8]) -> OtaResult<DfuPackage> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_data))?;

    let mut init_packet: Option<Vec<u8>> = None;
    let mut firmware: Option<Vec<u8>> = None;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.name().ends_with(".dat") {
            init_packet = Some(read_entry(&mut entry)?);
        } else if entry.name().ends_with(".bin") {
            firmware = Some(read_entry(&mut entry)?);
        }
    }

    let init_packet = init_packet.ok_or(OtaError::MissingPackageEntry { extension: ".dat" })?;
    let firmware = firmware.ok_or(OtaError::MissingPackageEntry { extension: ".bin" })?;

    Ok(DfuPackage {
        init_packet,
        firmware,
    })
}

/// Read a zip entry fully into memory.
fn read_entry(entry: &mut zip::read::ZipFile<'_>) -> OtaResult<Vec<u8>> {
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_parse_valid_package() {
        let data = build_zip(&[
            ("manifest.json", b"{}"),
            ("firmware.dat", &[0x0A, 0x0B, 0x0C]),
            ("firmware.bin", &[0x01, 0x02, 0x03, 0x04]),
        ]);

        let package = parse_dfu_package(&data).unwrap();

        assert_eq!(package.init_packet, vec![0x0A, 0x0B, 0x0C]);
        assert_eq!(package.firmware, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_parse_missing_dat() {
        let data = build_zip(&[("firmware.bin", &[0x01][..])]);

        let result = parse_dfu_package(&data);

        assert!(matches!(
            result,
            Err(OtaError::MissingPackageEntry { extension: ".dat" })
        ));
    }

    #[test]
    fn test_parse_missing_bin() {
        let data = build_zip(&[("firmware.dat", &[0x0A][..])]);

        let result = parse_dfu_package(&data);

        assert!(matches!(
            result,
            Err(OtaError::MissingPackageEntry { extension: ".bin" })
        ));
    }

    #[test]
    fn test_parse_zero_length_entries() {
        let data = build_zip(&[("app.dat", &[][..]), ("app.bin", &[][..])]);

        let package = parse_dfu_package(&data).unwrap();

        assert!(package.init_packet.is_empty());
        assert!(package.firmware.is_empty());
    }

    #[test]
    fn test_parse_duplicate_entries_last_wins() {
        let data = build_zip(&[
            ("a.dat", &[0x01][..]),
            ("b.dat", &[0x02][..]),
            ("a.bin", &[0x03][..]),
            ("b.bin", &[0x04][..]),
        ]);

        let package = parse_dfu_package(&data).unwrap();

        assert_eq!(package.init_packet, vec![0x02]);
        assert_eq!(package.firmware, vec![0x04]);
    }

    #[test]
    fn test_parse_not_a_zip() {
        let result = parse_dfu_package(&[0xDE, 0xAD, 0xBE, 0xEF]);

        assert!(matches!(result, Err(OtaError::Zip(_))));
    }
}
