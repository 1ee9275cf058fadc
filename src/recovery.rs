//! Working out where a streamed entry's data ends.
//!
//! When general purpose bit 3 is set, the local header's CRC and sizes are
//! zeroes and the real values follow the data in a data descriptor.
//! We don't know where the data ends until we find that descriptor,
//! and we can't find the descriptor until we know where the data ends.
//!
//! The way out:
//!
//! 1. Nothing can end after the next local header or the central directory,
//!    so those give an upper bound.
//!
//! 2. A deflate stream knows where it ends. Backing off the descriptor's size
//!    from the bound is close enough, since decompression stops at the
//!    end-of-stream marker regardless.
//!
//! 3. Stored data has no such marker, so scan forward for the descriptor's
//!    signature. This is the only pass over an entry's data at open time.

use std::io::{Read, Seek, SeekFrom};

use crc32fast::Hasher;
use log::*;

use crate::read::CompressionMethod;
use crate::result::*;
use crate::scan::{self, Direction, SIGNATURE_LEN};
use crate::spec::{DataDescriptor, LocalFileHeader, DATA_DESCRIPTOR_MAGIC};

/// What we learned about the extent of an entry's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamedLength {
    /// Sizes come from the local header.
    NotStreamed,
    /// The data ends somewhere before `end`.
    Bounded { end: u64 },
    /// A data descriptor followed the data.
    Descriptor(DataDescriptor),
    /// No descriptor could be found before the bound.
    Missing,
}

/// Returns the furthest a streamed entry's data (and its descriptor) could reach:
/// the first thing that comes after `data_pos`.
///
/// `header_offsets` must be sorted. Entries can be stored in any order,
/// so this is the next header in the file, not the next one in the directory.
pub(crate) fn data_bound(
    data_pos: u64,
    central_directory_offset: u64,
    source_len: u64,
    header_offsets: &[u64],
) -> u64 {
    let mut bound = central_directory_offset.min(source_len);
    let next = header_offsets.partition_point(|&offset| offset <= data_pos);
    if let Some(&next_header) = header_offsets.get(next) {
        bound = bound.min(next_header);
    }
    bound.max(data_pos)
}

/// Recovers the length of a streamed entry whose data starts at `data_pos`
/// and can't reach past `bound`.
pub(crate) fn recover_streamed_length<R: Read + Seek>(
    source: &mut R,
    header: &LocalFileHeader,
    data_pos: u64,
    bound: u64,
) -> ZipResult<StreamedLength> {
    let zip64 = header.has_zip64();
    let provisional_end = bound
        .saturating_sub(DataDescriptor::size_without_signature(zip64))
        .max(data_pos);

    if CompressionMethod::from_u16(header.compression_method) != CompressionMethod::None {
        return Ok(StreamedLength::Bounded {
            end: provisional_end,
        });
    }

    let window_end = (provisional_end + SIGNATURE_LEN - 1).min(bound);
    let mut checksum = RunningChecksum::new(data_pos);
    let mut search_from = data_pos;

    while let Some(candidate) = scan::find_signature(
        source,
        search_from..window_end,
        DATA_DESCRIPTOR_MAGIC,
        Direction::Forward,
    )? {
        search_from = candidate + 1;

        if candidate + DataDescriptor::size_in_file(zip64) > bound {
            trace!("Descriptor candidate at {} would overrun {}", candidate, bound);
            continue;
        }
        source.seek(SeekFrom::Start(candidate))?;
        let descriptor = DataDescriptor::read_from(source, zip64)?;
        trace!("{:?} at {}", descriptor, candidate);

        if cfg!(feature = "verify-crc32") {
            let scanned = candidate - data_pos;
            if descriptor.compressed_size != scanned || descriptor.uncompressed_size != scanned {
                debug!(
                    "Rejecting descriptor at {}: claims {} bytes, found {}",
                    candidate, descriptor.compressed_size, scanned
                );
                continue;
            }
            if checksum.up_to(source, candidate)? != descriptor.crc32 {
                debug!("Rejecting descriptor at {}: CRC mismatch", candidate);
                continue;
            }
        }
        return Ok(StreamedLength::Descriptor(descriptor));
    }
    Ok(StreamedLength::Missing)
}

/// CRC-32 of the data from its start to successive descriptor candidates,
/// so that each byte is only hashed once.
struct RunningChecksum {
    hasher: Hasher,
    hashed_to: u64,
}

impl RunningChecksum {
    fn new(start: u64) -> Self {
        Self {
            hasher: Hasher::new(),
            hashed_to: start,
        }
    }

    fn up_to<R: Read + Seek>(&mut self, source: &mut R, end: u64) -> ZipResult<u32> {
        debug_assert!(end >= self.hashed_to);
        source.seek(SeekFrom::Start(self.hashed_to))?;
        let mut remaining = source.take(end - self.hashed_to);
        let mut buf = [0u8; 8192];
        loop {
            let read = remaining.read(&mut buf)?;
            if read == 0 {
                break;
            }
            self.hasher.update(&buf[..read]);
        }
        self.hashed_to = end;
        Ok(self.hasher.clone().finalize())
    }
}
