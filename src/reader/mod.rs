//! Stream-oriented FASTQ/FASTA readers with transparent gzip detection
//! (spec.md §4.5).
//!
//! Mirrors the teacher's reflection-free factory pattern (spec.md §9):
//! [`open`] sniffs the input and returns a boxed [`Reader`] trait object,
//! so the AptaPlex driver depends only on the trait, never a concrete
//! reader type.

mod fasta;
mod fastq;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::bufread::GzDecoder;
use thiserror::Error;

pub use fasta::FastaReader;
pub use fastq::FastqReader;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors returned by reader construction and iteration.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file could not be opened or sniffed as FASTQ/FASTA.
    #[error("invalid input file: {0}")]
    InvalidInputFile(String),

    /// A FASTQ record's sequence and quality line lengths did not match.
    #[error("sequence/quality length mismatch ({seq_len} vs {qual_len})")]
    LengthMismatch { seq_len: usize, qual_len: usize },
}

/// One record yielded by a [`Reader`]: bases plus, for FASTQ, per-base
/// phred qualities. FASTA records carry no qualities.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Raw sequence bytes as read from the file (not yet uppercased).
    pub bases: Vec<u8>,
    /// Per-base phred quality bytes, `None` for FASTA input.
    pub qualities: Option<Vec<u8>>,
}

/// A single-threaded source of sequence records. Concrete readers
/// (FASTQ, FASTA) are selected at open time by [`open`]; callers never
/// construct one directly.
pub trait Reader: Send {
    /// Return the next record, or `None` at end of stream.
    fn next_record(&mut self) -> Result<Option<RawRecord>, ReaderError>;
}

/// Open `path`, transparently decompressing gzip (detected by magic
/// bytes) and selecting FASTQ or FASTA by the first non-whitespace byte
/// (`@` or `>`).
pub fn open(path: &Path) -> Result<Box<dyn Reader>, ReaderError> {
    let file = File::open(path)
        .map_err(|e| ReaderError::InvalidInputFile(format!("{}: {e}", path.display())))?;
    let mut buffered = BufReader::new(file);

    let is_gzip = {
        let prefix = buffered
            .fill_buf()
            .map_err(|e| ReaderError::InvalidInputFile(e.to_string()))?;
        prefix.len() >= 2 && prefix[0..2] == GZIP_MAGIC
    };

    let inner: Box<dyn BufRead + Send> = if is_gzip {
        Box::new(BufReader::new(GzDecoder::new(buffered)))
    } else {
        Box::new(buffered)
    };

    open_from_bufread(inner, path)
}

fn open_from_bufread(
    mut inner: Box<dyn BufRead + Send>,
    path: &Path,
) -> Result<Box<dyn Reader>, ReaderError> {
    let first_byte = {
        let prefix = inner
            .fill_buf()
            .map_err(|e| ReaderError::InvalidInputFile(e.to_string()))?;
        prefix.first().copied()
    };

    match first_byte {
        Some(b'@') => Ok(Box::new(FastqReader::new(inner))),
        Some(b'>') => Ok(Box::new(FastaReader::new(inner))),
        Some(_) => Err(ReaderError::InvalidInputFile(format!(
            "{}: unrecognized record leader byte",
            path.display()
        ))),
        None => Err(ReaderError::InvalidInputFile(format!(
            "{}: empty input",
            path.display()
        ))),
    }
}

/// Read a single `\n`- or `\r\n`-terminated line, trimming the newline.
/// Returns `Ok(None)` at EOF with no bytes read.
fn read_line(inner: &mut (impl BufRead + ?Sized)) -> Result<Option<Vec<u8>>, std::io::Error> {
    let mut buf = Vec::new();
    let n = inner.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sniffs_fastq_by_leading_at() {
        let data = b"@r1\nACGT\n+\nIIII\n".to_vec();
        let inner: Box<dyn BufRead + Send> = Box::new(Cursor::new(data));
        let reader = open_from_bufread(inner, Path::new("r.fastq")).unwrap();
        let _ = reader;
    }

    #[test]
    fn sniffs_fasta_by_leading_angle_bracket() {
        let data = b">r1\nACGT\n".to_vec();
        let inner: Box<dyn BufRead + Send> = Box::new(Cursor::new(data));
        let reader = open_from_bufread(inner, Path::new("r.fasta")).unwrap();
        let _ = reader;
    }

    #[test]
    fn rejects_unrecognized_leader() {
        let data = b"not a record\n".to_vec();
        let inner: Box<dyn BufRead + Send> = Box::new(Cursor::new(data));
        assert!(matches!(
            open_from_bufread(inner, Path::new("r.bin")),
            Err(ReaderError::InvalidInputFile(_))
        ));
    }
}
