//! Helpers for reading records out of the archive's byte source.
//!
//! Any `Read + Seek` will do: a `File`, a `BufReader<File>`,
//! or an `io::Cursor` around bytes already in memory (or memory-mapped).

use std::io::{self, Read, Seek, SeekFrom};

use crate::arch::usize;
use crate::result::*;

/// Returns the total length of the source, leaving it positioned at the start.
pub fn source_len<R: Seek>(source: &mut R) -> io::Result<u64> {
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Reads exactly `len` bytes starting at `offset`.
pub fn read_at<R: Read + Seek>(source: &mut R, offset: u64, len: u64) -> ZipResult<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    read_exact_vec(source, len)
}

/// Reads exactly `len` bytes from the source's current position.
///
/// The buffer grows as bytes arrive, so a bogus length from a corrupt record
/// runs into EOF instead of a giant allocation.
pub fn read_exact_vec<R: Read>(source: &mut R, len: u64) -> ZipResult<Vec<u8>> {
    let expected = usize(len)?;
    let mut buf = Vec::new();
    source.take(len).read_to_end(&mut buf)?;
    if buf.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted {} bytes, source had {}", expected, buf.len()),
        )
        .into());
    }
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_ranges() {
        let mut source = io::Cursor::new(b"0123456789".to_vec());
        source.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(source_len(&mut source).unwrap(), 10);
        assert_eq!(source.position(), 0);
        assert_eq!(read_at(&mut source, 3, 4).unwrap(), b"3456");
        assert_eq!(read_exact_vec(&mut source, 2).unwrap(), b"78");
    }

    #[test]
    fn short_source_is_an_io_error() {
        let mut source = io::Cursor::new(b"0123".to_vec());
        match read_at(&mut source, 2, 4) {
            Err(ZipError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("Expected an I/O error, got {:?}", other),
        }
    }
}
