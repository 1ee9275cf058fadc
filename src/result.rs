//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::read::Unreadable;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive (or one of its entries) uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// Inflating a deflated entry failed
    #[error("Couldn't inflate entry: {0}")]
    Decompress(#[from] flate2::DecompressError),

    /// The entry was indexed, but its data can't be located.
    #[error("Can't read {0}: {1}")]
    Unreadable(Utf8PathBuf, Unreadable),

    /// The extracted bytes don't match the CRC-32 from the central directory
    #[error("Invalid checksum for {0}")]
    Checksum(Utf8PathBuf),

    /// No entry in the archive has the given name
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A cast from a 64-bit int to a usize failed while sizing a buffer,
    /// probably on a 32-bit system.
    #[error("Zip entry too large for address space")]
    InsufficientAddressSpace,
}
