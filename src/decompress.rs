//! Inflating raw (headerless) deflate streams into memory.
//!
//! ZIP entries are bare deflate streams: no zlib or gzip wrapper.

use std::io::Read;

use flate2::{Decompress, FlushDecompress, Status};

use crate::result::*;

/// Size of each read from the source and of each inflated chunk
const CHUNK_SIZE: usize = 16 * 1024;

/// Deflate can't do better than about 1032:1,
/// so a claimed size past that is a lie we shouldn't allocate for.
const MAX_RATIO: u64 = 1032;

/// Inflates `compressed` in one go, given the uncompressed size up front.
pub fn inflate_sized(compressed: &[u8], size: usize) -> ZipResult<Vec<u8>> {
    if size as u64 > (compressed.len() as u64 + 1) * MAX_RATIO {
        return Err(ZipError::InvalidArchive(
            "Uncompressed size is impossibly large for its compressed size",
        ));
    }
    let mut inflater = Decompress::new(false);
    let mut inflated = Vec::with_capacity(size);
    let status = inflater.decompress_vec(compressed, &mut inflated, FlushDecompress::Finish)?;
    match status {
        Status::StreamEnd => Ok(inflated),
        _ if inflated.len() > size => Err(ZipError::InvalidArchive(
            "Deflate stream is longer than its declared size",
        )),
        _ if inflated.len() == size => {
            // The buffer is full, but the stream must end here too,
            // or the declared size was a lie.
            let rest = &compressed[inflater.total_in() as usize..];
            let mut overflow = [0u8; 1];
            let out_before = inflater.total_out();
            let status = inflater.decompress(rest, &mut overflow, FlushDecompress::Finish)?;
            if inflater.total_out() != out_before {
                Err(ZipError::InvalidArchive(
                    "Deflate stream is longer than its declared size",
                ))
            } else if status == Status::StreamEnd {
                Ok(inflated)
            } else {
                Err(ZipError::InvalidArchive("Deflate stream ended early"))
            }
        }
        _ => Err(ZipError::InvalidArchive("Deflate stream ended early")),
    }
}

/// Inflates a stream of unknown size, pulling compressed bytes from `input`
/// in fixed-size chunks until the stream says it's done.
///
/// `input` may run past the end of the stream;
/// anything after it is ignored.
pub fn inflate_streamed<R: Read>(mut input: R) -> ZipResult<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut inflated = Vec::new();

    let mut in_buf = vec![0u8; CHUNK_SIZE];
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    // The unconsumed input is in_buf[in_start..in_end].
    let mut in_start = 0;
    let mut in_end = 0;
    let mut input_done = false;

    loop {
        if in_start == in_end && !input_done {
            in_start = 0;
            in_end = input.read(&mut in_buf)?;
            input_done = in_end == 0;
        }

        let in_before = inflater.total_in();
        let out_before = inflater.total_out();
        let status = inflater.decompress(
            &in_buf[in_start..in_end],
            &mut out_buf,
            FlushDecompress::None,
        )?;
        let consumed = (inflater.total_in() - in_before) as usize;
        let produced = (inflater.total_out() - out_before) as usize;
        in_start += consumed;
        inflated.extend_from_slice(&out_buf[..produced]);

        if status == Status::StreamEnd {
            return Ok(inflated);
        }
        if consumed == 0 && produced == 0 {
            if input_done {
                return Err(ZipError::InvalidArchive("Deflate stream ended early"));
            }
            // Stuck on a partial chunk; slide it down and top it off.
            if in_start != in_end {
                in_buf.copy_within(in_start..in_end, 0);
                in_end -= in_start;
                in_start = 0;
                if in_end == in_buf.len() {
                    return Err(ZipError::InvalidArchive("Deflate stream made no progress"));
                }
                let read = input.read(&mut in_buf[in_end..])?;
                input_done = read == 0;
                in_end += read;
            }
        }
    }
}
