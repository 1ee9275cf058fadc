//! kzip is a read-only Zip archive reader that handles Zip64 archives
//! and entries streamed without their sizes up front:
//!
//! ```no_run
//! # use kzip::*;
//! let archive = ZipArchive::open_path("foo.zip")?;
//!
//! // Look up an entry by the exact name it's stored under...
//! let readme = archive.directory().lookup("docs/README.md")?;
//! let bytes = readme.try_data()?;
//!
//! // ...or go through all of them in the order the archive lists them.
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.path, entry.size);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Any `Read + Seek` byte source works, so memory-mapped archives are just a
//! `Cursor` away:
//! ```no_run
//! # use std::fs::File;
//! # use std::io::Cursor;
//! # use memmap2::Mmap;
//! # use kzip::*;
//! let zip_file = File::open("foo.zip")?;
//! let mapping = unsafe { Mmap::map(&zip_file)? };
//! let archive = ZipArchive::open(Cursor::new(&mapping[..]))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Opening an archive reads its whole directory: the End of central directory
//! record at the back of the file, the central directory it points to,
//! and each entry's local header.
//! Entries with general purpose bit 3 set don't say how big they are until
//! after their data, so their extent is recovered by bounding them with
//! whatever comes next in the file and, for stored entries,
//! scanning for the data descriptor.
//! Decompression only happens when an entry's data is asked for,
//! and nothing is cached.
//!
//! An archive owns its byte source, so it can't be shared between threads.
//! Open it once per thread to read in parallel.

pub mod read;
pub mod result;

pub use directory::{Directory, Entry, Node};
pub use read::CompressionMethod;
pub use read::FileMetadata;
pub use read::Unreadable;
pub use read::ZipArchive;
pub use result::{ZipError, ZipResult};
pub use spec::Trailer;

mod arch;
mod cursor;
mod decompress;
mod directory;
mod recovery;
mod scan;
mod source;
mod spec;
