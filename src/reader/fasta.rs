//! FASTA reader: header line then one or more sequence lines until the
//! next header or EOF (spec.md §4.5). No qualities.

use std::io::BufRead;

use super::{RawRecord, Reader, ReaderError, read_line};

/// Reads FASTA records from any buffered byte source.
pub struct FastaReader {
    inner: Box<dyn BufRead + Send>,
    /// A header line read while scanning past the previous record's
    /// sequence lines, held until the next `next_record` call.
    pending_header: Option<Vec<u8>>,
}

impl FastaReader {
    pub(super) fn new(inner: Box<dyn BufRead + Send>) -> Self {
        Self {
            inner,
            pending_header: None,
        }
    }
}

impl Reader for FastaReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>, ReaderError> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match read_line(&mut self.inner)? {
                Some(l) => l,
                None => return Ok(None),
            },
        };
        if !header.starts_with(b">") {
            return Err(ReaderError::InvalidInputFile(
                "FASTA record missing '>' header".into(),
            ));
        }

        let mut bases = Vec::new();
        loop {
            match read_line(&mut self.inner)? {
                None => break,
                Some(line) if line.starts_with(b">") => {
                    self.pending_header = Some(line);
                    break;
                }
                Some(line) => bases.extend_from_slice(&line),
            }
        }

        Ok(Some(RawRecord {
            bases,
            qualities: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &[u8]) -> FastaReader {
        let inner: Box<dyn BufRead + Send> = Box::new(Cursor::new(data.to_vec()));
        FastaReader::new(inner)
    }

    #[test]
    fn reads_single_record() {
        let mut r = reader(b">r1\nACGT\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.bases, b"ACGT");
        assert!(rec.qualities.is_none());
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn joins_wrapped_sequence_lines() {
        let mut r = reader(b">r1\nACGT\nTTTT\n>r2\nGGGG\n");
        let rec1 = r.next_record().unwrap().unwrap();
        assert_eq!(rec1.bases, b"ACGTTTTT");
        let rec2 = r.next_record().unwrap().unwrap();
        assert_eq!(rec2.bases, b"GGGG");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn missing_header_marker_errors() {
        let mut r = reader(b"ACGT\n");
        assert!(matches!(
            r.next_record(),
            Err(ReaderError::InvalidInputFile(_))
        ));
    }
}
