//! Bounded searches for the 4-byte magic numbers that ZIP records start with.
//!
//! Some records can't be found at a fixed offset:
//! the End of central directory record is followed by a comment of up to 64 KiB,
//! and a streamed entry's data descriptor sits wherever its data happens to end.
//! Both are found by scanning a window of the archive for the signature.

use std::cmp;
use std::io::{Read, Seek};
use std::ops::Range;

use memchr::memmem;

use crate::result::*;
use crate::source::read_at;

/// How many bytes each signature is
pub const SIGNATURE_LEN: u64 = 4;

/// How much of the window we pull into memory at a time
const CHUNK_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Report the match with the lowest offset
    Forward,
    /// Report the match with the highest offset
    Backward,
}

/// Searches the bytes of `source` in `window` for the little-endian `signature`,
/// returning the absolute offset of the first match in the given direction.
///
/// A match must lie entirely inside the window.
pub fn find_signature<R: Read + Seek>(
    source: &mut R,
    window: Range<u64>,
    signature: u32,
    direction: Direction,
) -> ZipResult<Option<u64>> {
    find_signature_chunked(source, window, signature, direction, CHUNK_SIZE)
}

fn find_signature_chunked<R: Read + Seek>(
    source: &mut R,
    window: Range<u64>,
    signature: u32,
    direction: Direction,
    chunk_size: u64,
) -> ZipResult<Option<u64>> {
    debug_assert!(chunk_size >= SIGNATURE_LEN);
    let needle = signature.to_le_bytes();
    // Consecutive chunks share this many bytes
    // so that a signature straddling them isn't missed.
    let overlap = SIGNATURE_LEN - 1;

    if window.end < window.start.saturating_add(SIGNATURE_LEN) {
        return Ok(None);
    }

    match direction {
        Direction::Forward => {
            let mut chunk_start = window.start;
            loop {
                let chunk_end = cmp::min(chunk_start.saturating_add(chunk_size), window.end);
                let chunk = read_at(source, chunk_start, chunk_end - chunk_start)?;
                if let Some(i) = memmem::find(&chunk, &needle) {
                    return Ok(Some(chunk_start + i as u64));
                }
                if chunk_end == window.end {
                    return Ok(None);
                }
                chunk_start = chunk_end - overlap;
            }
        }
        Direction::Backward => {
            let mut chunk_end = window.end;
            loop {
                let chunk_start = cmp::max(chunk_end.saturating_sub(chunk_size), window.start);
                let chunk = read_at(source, chunk_start, chunk_end - chunk_start)?;
                if let Some(i) = memmem::rfind(&chunk, &needle) {
                    return Ok(Some(chunk_start + i as u64));
                }
                if chunk_start == window.start {
                    return Ok(None);
                }
                chunk_end = chunk_start + overlap;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    const MAGIC: u32 = 0x06054b50;

    fn haystack() -> Cursor<Vec<u8>> {
        let mut bytes = vec![0u8; 40];
        bytes[5..9].copy_from_slice(b"PK\x05\x06");
        bytes[17..21].copy_from_slice(b"PK\x05\x06");
        bytes[33..37].copy_from_slice(b"PK\x05\x06");
        Cursor::new(bytes)
    }

    #[test]
    fn finds_in_both_directions() {
        let mut source = haystack();
        assert_eq!(
            find_signature(&mut source, 0..40, MAGIC, Direction::Forward).unwrap(),
            Some(5)
        );
        assert_eq!(
            find_signature(&mut source, 0..40, MAGIC, Direction::Backward).unwrap(),
            Some(33)
        );
    }

    #[test]
    fn respects_the_window() {
        let mut source = haystack();
        assert_eq!(
            find_signature(&mut source, 6..40, MAGIC, Direction::Forward).unwrap(),
            Some(17)
        );
        // The last match doesn't fit entirely in the window.
        assert_eq!(
            find_signature(&mut source, 0..36, MAGIC, Direction::Backward).unwrap(),
            Some(17)
        );
        assert_eq!(
            find_signature(&mut source, 6..20, MAGIC, Direction::Forward).unwrap(),
            None
        );
        assert_eq!(
            find_signature(&mut source, 10..12, MAGIC, Direction::Backward).unwrap(),
            None
        );
    }

    #[test]
    fn matches_straddling_chunks() {
        for chunk_size in 4..12 {
            let mut source = haystack();
            assert_eq!(
                find_signature_chunked(&mut source, 0..40, MAGIC, Direction::Forward, chunk_size)
                    .unwrap(),
                Some(5),
                "forward, chunk size {}",
                chunk_size
            );
            assert_eq!(
                find_signature_chunked(&mut source, 0..40, MAGIC, Direction::Backward, chunk_size)
                    .unwrap(),
                Some(33),
                "backward, chunk size {}",
                chunk_size
            );
            assert_eq!(
                find_signature_chunked(&mut source, 21..33, MAGIC, Direction::Forward, chunk_size)
                    .unwrap(),
                None
            );
        }
    }
}
