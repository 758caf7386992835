//! FASTQ reader: four lines per record (spec.md §4.5).

use std::io::BufRead;

use super::{RawRecord, Reader, ReaderError, read_line};

/// Reads FASTQ records (header, sequence, `+` separator, qualities) from
/// any buffered byte source.
pub struct FastqReader {
    inner: Box<dyn BufRead + Send>,
}

impl FastqReader {
    pub(super) fn new(inner: Box<dyn BufRead + Send>) -> Self {
        Self { inner }
    }
}

impl Reader for FastqReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>, ReaderError> {
        let Some(header) = read_line(&mut self.inner)? else {
            return Ok(None);
        };
        if !header.starts_with(b"@") {
            return Err(ReaderError::InvalidInputFile(
                "FASTQ record missing '@' header".into(),
            ));
        }

        let sequence = read_line(&mut self.inner)?.ok_or_else(|| {
            ReaderError::InvalidInputFile("truncated FASTQ record: missing sequence line".into())
        })?;
        let separator = read_line(&mut self.inner)?.ok_or_else(|| {
            ReaderError::InvalidInputFile("truncated FASTQ record: missing '+' line".into())
        })?;
        if !separator.starts_with(b"+") {
            return Err(ReaderError::InvalidInputFile(
                "FASTQ record missing '+' separator".into(),
            ));
        }
        let qualities = read_line(&mut self.inner)?.ok_or_else(|| {
            ReaderError::InvalidInputFile("truncated FASTQ record: missing quality line".into())
        })?;

        if sequence.len() != qualities.len() {
            return Err(ReaderError::LengthMismatch {
                seq_len: sequence.len(),
                qual_len: qualities.len(),
            });
        }

        Ok(Some(RawRecord {
            bases: sequence,
            qualities: Some(qualities),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &[u8]) -> FastqReader {
        let inner: Box<dyn BufRead + Send> = Box::new(Cursor::new(data.to_vec()));
        FastqReader::new(inner)
    }

    #[test]
    fn reads_single_record() {
        let mut r = reader(b"@r1\nACGT\n+\nIIII\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.bases, b"ACGT");
        assert_eq!(rec.qualities.unwrap(), b"IIII");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn reads_multiple_records() {
        let mut r = reader(b"@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nJJJJ\n");
        assert_eq!(r.next_record().unwrap().unwrap().bases, b"ACGT");
        assert_eq!(r.next_record().unwrap().unwrap().bases, b"TTTT");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let mut r = reader(b"@r1\nACGT\n+\nII\n");
        assert!(matches!(
            r.next_record(),
            Err(ReaderError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn missing_header_marker_errors() {
        let mut r = reader(b"r1\nACGT\n+\nIIII\n");
        assert!(matches!(
            r.next_record(),
            Err(ReaderError::InvalidInputFile(_))
        ));
    }
}
