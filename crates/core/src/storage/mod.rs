pub mod ledger;
pub mod observations;

pub use ledger::AveragePositionLedger;
pub use observations::{ObservationStore, ProductSummary};

use encoding_rs::WINDOWS_1251;
use std::io::{self, Write};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads a text file, `Ok(None)` if it does not exist.
///
/// UTF-8 (with or without BOM) is taken as is; anything else is decoded as
/// Windows-1251, the usual encoding of spreadsheet exports with Cyrillic headers.
pub(crate) fn read_text(path: &Path) -> io::Result<Option<String>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(decode_text(&bytes)))
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (cow, _, had_errors) = WINDOWS_1251.decode(body);
            if had_errors {
                tracing::warn!("input is neither UTF-8 nor clean Windows-1251; decoded lossily");
            }
            cow.into_owned()
        }
    }
}

/// Replaces `path` with `bytes` via a temp file in the same directory and a rename,
/// so readers see either the old or the new contents.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Parses an integer cell; tolerates the `.0` tail of float-typed exports.
pub(crate) fn parse_int(raw: &str) -> Option<u32> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(n) = t.parse::<u32>() {
        return Some(n);
    }
    let f = t.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

pub(crate) fn parse_num(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bom_and_windows_1251() {
        let with_bom = [UTF8_BOM, "Артикул".as_bytes()].concat();
        assert_eq!(decode_text(&with_bom), "Артикул");

        let (cp1251, _, _) = WINDOWS_1251.encode("Артикул,Позиция");
        assert_eq!(decode_text(&cp1251), "Артикул,Позиция");
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_text(&dir.path().join("absent.csv")).unwrap().is_none());
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.csv");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn integer_cells_accept_float_tail() {
        assert_eq!(parse_int("12"), Some(12));
        assert_eq!(parse_int(" 7.0 "), Some(7));
        assert_eq!(parse_int("7.5"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("nan"), None);
        assert_eq!(parse_num("0.35"), Some(0.35));
    }
}
