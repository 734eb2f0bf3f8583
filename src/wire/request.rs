//! Request reader (T1). Parses newline/NUL-framed requests off an
//! async byte stream, per spec.md §6: one record per line,
//! NUL-terminated, fields tab-separated (`id`, `dir`, optional
//! `diag`).

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::ScanError;

const FIELD_SEP: u8 = b'\t';
const RECORD_TERMINATOR: u8 = 0;

/// One parsed request. `id` is kept as raw bytes (spec.md: "opaque
/// byte string, no NUL, no tab") and echoed verbatim; `dir` is built
/// from raw bytes rather than validated UTF-8, since paths on Unix are
/// themselves byte strings and a status daemon that panics on a
/// non-UTF-8 path is a real failure mode this one avoids (SPEC_FULL.md
/// §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: Vec<u8>,
    pub dir: PathBuf,
    pub diag: bool,
}

/// Reads one NUL-terminated record from `reader` and parses it into a
/// [`Request`]. Returns `Ok(None)` on a clean EOF (no bytes read at
/// all) so the request loop can distinguish "stream closed" from "one
/// malformed record".
pub async fn read_request<R>(reader: &mut R) -> std::io::Result<Option<ParsedRequest>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(RECORD_TERMINATOR, &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&RECORD_TERMINATOR) {
        buf.pop();
    }
    Ok(Some(parse_record(&buf)))
}

/// A parsed record is itself fallible (spec.md §7 `parse-error`); the
/// caller logs and silently drops the request on `Err` rather than
/// treating it as a fatal read error.
pub type ParsedRequest = Result<Request, ScanError>;

fn parse_record(record: &[u8]) -> ParsedRequest {
    let mut fields = record.split(|&b| b == FIELD_SEP);

    let id = fields
        .next()
        .ok_or_else(|| ScanError::ParseError("missing id field".into()))?
        .to_vec();
    if id.is_empty() {
        return Err(ScanError::ParseError("empty id field".into()));
    }

    let dir_bytes = fields
        .next()
        .ok_or_else(|| ScanError::ParseError("missing dir field".into()))?;
    if dir_bytes.is_empty() {
        return Err(ScanError::ParseError("empty dir field".into()));
    }
    let dir = bytes_to_path(dir_bytes);
    if !dir.is_absolute() {
        return Err(ScanError::ParseError(format!(
            "dir must be absolute: {}",
            dir.display()
        )));
    }

    let diag = match fields.next() {
        None => false,
        Some(b"1") => true,
        Some(b"") => false,
        Some(other) => {
            return Err(ScanError::ParseError(format!(
                "invalid diag flag: {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };

    if fields.next().is_some() {
        return Err(ScanError::ParseError("too many fields".into()));
    }

    Ok(Request { id, dir, diag })
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn parses_minimal_request() {
        let mut input = Cursor::new(b"req-1\t/tmp/foo\0".to_vec());
        let req = read_request(&mut input).await.unwrap().unwrap().unwrap();
        assert_eq!(req.id, b"req-1");
        assert_eq!(req.dir, PathBuf::from("/tmp/foo"));
        assert!(!req.diag);
    }

    #[tokio::test]
    async fn parses_diag_flag() {
        let mut input = Cursor::new(b"req-2\t/tmp/foo\t1\0".to_vec());
        let req = read_request(&mut input).await.unwrap().unwrap().unwrap();
        assert!(req.diag);
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut input = Cursor::new(Vec::new());
        assert!(read_request(&mut input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn relative_dir_is_a_parse_error() {
        let mut input = Cursor::new(b"req-3\trelative/path\0".to_vec());
        let parsed = read_request(&mut input).await.unwrap().unwrap();
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn reads_two_records_in_sequence() {
        let mut input = Cursor::new(b"a\t/x\0b\t/y\0".to_vec());
        let first = read_request(&mut input).await.unwrap().unwrap().unwrap();
        let second = read_request(&mut input).await.unwrap().unwrap().unwrap();
        assert_eq!(first.id, b"a");
        assert_eq!(second.id, b"b");
    }
}
