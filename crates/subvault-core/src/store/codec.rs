//! zstd-compressed JSON-lines encoding shared by snapshots and deltas.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::error::{VaultError, VaultResult};
use crate::types::SubdomainRecord;

/// zstd level 3: fast with good ratio for line-oriented JSON
const COMPRESSION_LEVEL: i32 = 3;

/// Counts gathered while streaming a compressed record file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    pub records: usize,
    pub skipped: usize,
}

fn encode_into<W: Write>(writer: W, records: &[SubdomainRecord]) -> VaultResult<W> {
    let mut encoder = zstd::stream::write::Encoder::new(writer, COMPRESSION_LEVEL)?;
    for record in records {
        serde_json::to_writer(&mut encoder, record)?;
        encoder.write_all(b"\n")?;
    }
    Ok(encoder.finish()?)
}

/// Replace `path` with the encoded records.
///
/// Data goes to a temp file in the same directory, is synced, then renamed over
/// `path`. A failure at any step leaves the previous file untouched.
pub(crate) fn replace_file(path: &Path, records: &[SubdomainRecord]) -> VaultResult<()> {
    let dir = path.parent().ok_or_else(|| {
        VaultError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;

    let tmp = tempfile::Builder::new()
        .prefix(".snapshot-")
        .tempfile_in(dir)?;
    let tmp = encode_into(BufWriter::new(tmp), records)?
        .into_inner()
        .map_err(|e| e.into_error())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write the encoded records to a new file; fails if `path` already exists.
pub(crate) fn create_file(path: &Path, records: &[SubdomainRecord]) -> VaultResult<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let file = encode_into(BufWriter::new(file), records)?
        .into_inner()
        .map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Stream every parseable record in `path` to `visit`.
///
/// A missing file yields nothing. Blank lines are ignored and lines that do not
/// parse are skipped with a warning. A broken compressed stream is `CorruptData`.
pub(crate) fn read_file<F>(path: &Path, mut visit: F) -> VaultResult<ReadStats>
where
    F: FnMut(SubdomainRecord),
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReadStats::default()),
        Err(e) => return Err(e.into()),
    };

    let decoder = zstd::stream::read::Decoder::new(file)?;
    let mut reader = BufReader::new(decoder);
    let mut stats = ReadStats::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| VaultError::CorruptData(format!("{}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_slice::<SubdomainRecord>(trimmed) {
            Ok(record) => {
                stats.records += 1;
                visit(record);
            }
            Err(e) => {
                stats.skipped += 1;
                warn!(
                    path = %path.display(),
                    error = %e,
                    line = %String::from_utf8_lossy(trimmed),
                    "Skipping unparseable record line"
                );
            }
        }
    }

    Ok(stats)
}
