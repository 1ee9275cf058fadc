//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, [`open`](ZipArchive::open) a [`ZipArchive`]
//! over any seekable byte source.
//! Everything about the archive's layout is worked out up front;
//! entries are only decompressed when asked for.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use log::*;

use crate::arch::usize;
use crate::decompress;
use crate::directory::Directory;
use crate::recovery::{self, StreamedLength};
use crate::result::*;
use crate::source::{read_exact_vec, source_len};
use crate::spec::{self, CentralDirectoryEntry, LocalFileHeader, Trailer};

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    None,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

/// Why an entry's data can't be read, even though it's in the directory
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unreadable {
    /// The entry lives on another disk of a multi-disk archive.
    OtherDisk(u32),
    /// The entry is streamed, and its data descriptor couldn't be found.
    DescriptorNotFound,
}

impl fmt::Display for Unreadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unreadable::OtherDisk(disk) => write!(f, "stored on disk {}", disk),
            Unreadable::DescriptorNotFound => f.write_str("couldn't find its data descriptor"),
        }
    }
}

/// Metadata for a file or directory in the archive
///
/// This merges the entry's central directory record, its local file header,
/// and (for streamed entries) its data descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// The provided path of the file, exactly as stored.
    pub path: Utf8PathBuf,

    /// Uncompressed size of the file in bytes
    pub size: u64,

    /// Compressed size of the file in bytes
    pub compressed_size: u64,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// True if the file is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// True if the file's sizes came after its data (general purpose bit 3)
    pub streamed: bool,

    /// The date and time the file was last modified,
    /// if the archive holds a valid one
    pub last_modified: Option<NaiveDateTime>,

    /// The file's comment from the central directory
    pub comment: Vec<u8>,

    /// Set if the data can't be read
    pub unreadable: Option<Unreadable>,

    /// The offset to the local file header in the archive
    pub(crate) header_offset: u64,

    /// Where the (compressed) data starts and ends in the archive
    pub(crate) data_pos: u64,
    pub(crate) data_end: u64,
}

/// What we found at an entry's local header
pub(crate) enum LocalResolution<'a> {
    /// Nothing; the entry is on a disk we don't have.
    OtherDisk(u32),
    Resolved {
        header: &'a LocalFileHeader,
        data_pos: u64,
        length: StreamedLength,
    },
}

impl FileMetadata {
    /// Builds an entry's metadata from everything we know about it.
    ///
    /// The central directory is the authority on names, CRCs, comments,
    /// and which disk an entry is on.
    /// The local header says how the data is compressed and,
    /// unless the entry is streamed, how big it is.
    pub(crate) fn resolve(
        cde: &CentralDirectoryEntry,
        local: LocalResolution<'_>,
    ) -> ZipResult<Self> {
        let path = Utf8PathBuf::from(cde.decode_path()?);
        let last_modified = spec::parse_msdos(cde.last_modified_time, cde.last_modified_date);

        let (header, data_pos, length) = match local {
            LocalResolution::OtherDisk(disk) => {
                return Ok(Self {
                    path,
                    size: cde.uncompressed_size(),
                    compressed_size: cde.compressed_size(),
                    compression_method: CompressionMethod::from_u16(cde.compression_method),
                    crc32: cde.crc32,
                    encrypted: spec::is_encrypted(cde.flags),
                    streamed: spec::is_streamed(cde.flags),
                    last_modified,
                    comment: cde.file_comment.clone(),
                    unreadable: Some(Unreadable::OtherDisk(disk)),
                    header_offset: cde.header_offset(),
                    data_pos: 0,
                    data_end: 0,
                });
            }
            LocalResolution::Resolved {
                header,
                data_pos,
                length,
            } => (header, data_pos, length),
        };

        let compression_method = CompressionMethod::from_u16(header.compression_method);
        let overflow = ZipError::InvalidArchive("Entry data runs past any possible offset");

        let mut unreadable = None;
        let (size, compressed_size, data_end) = match length {
            StreamedLength::NotStreamed => {
                let size = header.uncompressed_size();
                let compressed_size = header.compressed_size();
                let stored_size = if compression_method == CompressionMethod::None {
                    size
                } else {
                    compressed_size
                };
                let data_end = data_pos.checked_add(stored_size).ok_or(overflow)?;
                (size, compressed_size, data_end)
            }
            StreamedLength::Bounded { end } => {
                (cde.uncompressed_size(), cde.compressed_size(), end)
            }
            StreamedLength::Descriptor(descriptor) => {
                let data_end = data_pos
                    .checked_add(descriptor.uncompressed_size)
                    .ok_or(overflow)?;
                (
                    descriptor.uncompressed_size,
                    descriptor.compressed_size,
                    data_end,
                )
            }
            StreamedLength::Missing => {
                unreadable = Some(Unreadable::DescriptorNotFound);
                (cde.uncompressed_size(), cde.compressed_size(), data_pos)
            }
        };

        Ok(Self {
            path,
            size,
            compressed_size,
            compression_method,
            crc32: cde.crc32,
            encrypted: spec::is_encrypted(cde.flags),
            streamed: spec::is_streamed(header.flags),
            last_modified,
            comment: cde.file_comment.clone(),
            unreadable,
            header_offset: cde.header_offset(),
            data_pos,
            data_end,
        })
    }

    /// The entry's name, exactly as stored (directories end in `/`)
    pub fn name(&self) -> &str {
        self.path.as_str()
    }

    /// The entry's path
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        // Path::ends_with() doesn't consider separators,
        // so we need a different approach.
        self.path.as_str().ends_with('/')
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Where the entry's (possibly compressed) bytes sit in the archive
    pub fn data_range(&self) -> Range<u64> {
        self.data_pos..self.data_end
    }
}

/// A ZIP archive to be read
///
/// The archive owns its byte source, and reads from it whenever an entry's
/// data is requested. That makes it `!Sync`:
/// to read in parallel, open the archive once per thread.
pub struct ZipArchive<R> {
    source: RefCell<R>,
    trailer: Trailer,
    /// A list of entries from the ZIP's central directory
    entries: Vec<FileMetadata>,
    /// Maps names to indexes in `entries`
    names: BTreeMap<String, usize>,
}

impl ZipArchive<BufReader<File>> {
    /// Opens the ZIP archive at the given path.
    ///
    /// ```no_run
    /// # use kzip::*;
    /// let archive = ZipArchive::open_path("foo.zip")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_path<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Reads a ZIP archive's directory from a seekable byte source.
    ///
    /// Either the whole directory is parsed, or this fails;
    /// there's no partially-read archive.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use std::io::Cursor;
    /// # use kzip::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::open(Cursor::new(bytes))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(mut source: R) -> ZipResult<Self> {
        let source_len = source_len(&mut source)?;
        let trailer = Trailer::locate(&mut source, source_len)?;

        let entry_count = trailer.entries();
        let central_directory_offset = trailer.central_directory_offset();
        trace!(
            "{} entries at offset {}",
            entry_count,
            central_directory_offset
        );

        // Don't let a bogus entry count talk us into a huge allocation.
        let plausible_count = entry_count.min(source_len / CentralDirectoryEntry::FIXED_SIZE);
        let mut directory = Vec::with_capacity(usize(plausible_count)?);

        source.seek(SeekFrom::Start(central_directory_offset))?;
        for _ in 0..entry_count {
            let dir_entry = CentralDirectoryEntry::read_from(&mut source)?;
            trace!("{:?}", dir_entry);
            directory.push(dir_entry);
        }

        // Find where each entry's data starts.
        let mut locals = Vec::with_capacity(directory.len());
        for dir_entry in &directory {
            let disk = dir_entry.disk_number();
            if disk != trailer.disk_number() {
                warn!(
                    "Entry at {} is on disk {}, not {}; it won't be readable",
                    dir_entry.header_offset(),
                    disk,
                    trailer.disk_number()
                );
                locals.push(None);
                continue;
            }
            let header_offset = dir_entry.header_offset();
            source.seek(SeekFrom::Start(header_offset))?;
            let local_header = LocalFileHeader::read_from(&mut source)?;
            trace!("{:?}", local_header);
            let data_pos = header_offset
                .checked_add(local_header.size_in_file())
                .ok_or(ZipError::InvalidArchive("Invalid local file header offset"))?;
            locals.push(Some((local_header, data_pos)));
        }

        let mut header_offsets: Vec<u64> = directory
            .iter()
            .zip(&locals)
            .filter(|(_, local)| local.is_some())
            .map(|(dir_entry, _)| dir_entry.header_offset())
            .collect();
        header_offsets.sort_unstable();

        let mut entries = Vec::with_capacity(directory.len());
        for (dir_entry, local) in directory.iter().zip(&locals) {
            let resolution = match local {
                None => LocalResolution::OtherDisk(dir_entry.disk_number()),
                Some((header, data_pos)) => {
                    let length = if spec::is_streamed(header.flags) {
                        let bound = recovery::data_bound(
                            *data_pos,
                            central_directory_offset,
                            source_len,
                            &header_offsets,
                        );
                        let length = recovery::recover_streamed_length(
                            &mut source,
                            header,
                            *data_pos,
                            bound,
                        )?;
                        debug!("Streamed entry at {} bounded by {}: {:?}", data_pos, bound, length);
                        length
                    } else {
                        StreamedLength::NotStreamed
                    };
                    LocalResolution::Resolved {
                        header,
                        data_pos: *data_pos,
                        length,
                    }
                }
            };
            let file_metadata = FileMetadata::resolve(dir_entry, resolution)?;
            debug!("{:?}", file_metadata);
            if file_metadata.unreadable == Some(Unreadable::DescriptorNotFound) {
                warn!(
                    "Couldn't find the data descriptor for {}; it won't be readable",
                    file_metadata.path
                );
            }
            entries.push(file_metadata);
        }

        // The first entry with a given name wins.
        let mut names = BTreeMap::new();
        for (i, entry) in entries.iter().enumerate() {
            names.entry(entry.name().to_owned()).or_insert(i);
        }

        Ok(ZipArchive {
            source: RefCell::new(source),
            trailer,
            entries,
            names,
        })
    }

    /// Returns the entries found in the ZIP archive's central directory,
    /// in the order they appear there.
    ///
    /// No effort is made to deduplicate these entries.
    pub fn entries(&self) -> &[FileMetadata] {
        &self.entries
    }

    /// Looks up an entry by its exact name.
    pub fn by_name(&self, name: &str) -> Option<&FileMetadata> {
        self.names.get(name).map(|&i| &self.entries[i])
    }

    /// The archive's End of central directory record (and Zip64 extensions)
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// The archive comment
    pub fn comment(&self) -> &[u8] {
        self.trailer.comment()
    }

    /// The root of the archive's entries, to look them up by name.
    pub fn directory(&self) -> Directory<'_, R> {
        Directory::new(self)
    }

    /// Reads and decompresses the given file from the ZIP archive.
    ///
    /// Nothing is cached; each call goes back to the source.
    pub fn read(&self, metadata: &FileMetadata) -> ZipResult<Vec<u8>> {
        if let Some(why) = metadata.unreadable {
            return Err(ZipError::Unreadable(metadata.path.clone(), why));
        }
        if metadata.encrypted {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                metadata.path
            )));
        }
        debug!("Reading {}", metadata.path);

        let mut source = self.source.borrow_mut();
        let source = &mut *source;
        source.seek(SeekFrom::Start(metadata.data_pos))?;
        let data_len = metadata.data_end - metadata.data_pos;

        let data = match metadata.compression_method {
            CompressionMethod::None => read_exact_vec(source, data_len)?,
            // We only know where the stream ends once we've inflated it.
            CompressionMethod::Deflate if metadata.streamed => {
                decompress::inflate_streamed(source.take(data_len))?
            }
            CompressionMethod::Deflate => {
                let compressed = read_exact_vec(source, data_len)?;
                decompress::inflate_sized(&compressed, usize(metadata.size)?)?
            }
            CompressionMethod::Unsupported(method) => {
                return Err(ZipError::UnsupportedArchive(format!(
                    "Compression method {} of {} not supported",
                    method, metadata.path
                )));
            }
        };

        if cfg!(feature = "verify-crc32") && crc32fast::hash(&data) != metadata.crc32 {
            return Err(ZipError::Checksum(metadata.path.clone()));
        }
        Ok(data)
    }

    /// Like [`read()`](Self::read), but logs any failure and returns no bytes.
    pub fn data(&self, metadata: &FileMetadata) -> Vec<u8> {
        self.read(metadata).unwrap_or_else(|e| {
            warn!("Couldn't read {}: {}", metadata.path, e);
            Vec::new()
        })
    }

    /// Gives back the byte source.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

impl<R> fmt::Debug for ZipArchive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("trailer", &self.trailer)
            .field("entries", &self.entries)
            .finish()
    }
}

// So a mapped or fully-read archive can be opened without an explicit Cursor
impl<'a> ZipArchive<io::Cursor<&'a [u8]>> {
    /// Opens an archive that's already in memory (or memory mapped).
    pub fn from_bytes(bytes: &'a [u8]) -> ZipResult<Self> {
        Self::open(io::Cursor::new(bytes))
    }
}
