//! A flat, name-indexed view of an archive's entries
//!
//! ZIP doesn't have directories, just entries whose names happen to contain
//! slashes (and, by convention, directory entries whose names end in one).
//! So the view is flat: the root holds every entry under its full name.

use std::io::{Read, Seek};

use camino::Utf8PathBuf;

use crate::read::{FileMetadata, ZipArchive};
use crate::result::*;

/// Something found in an archive's directory
pub trait Node {
    /// Returns true if the node holds file data.
    fn is_file(&self) -> bool;

    /// The node's name, exactly as stored in the archive
    fn name(&self) -> &str;
}

/// The root of an archive's entries
pub struct Directory<'a, R> {
    archive: &'a ZipArchive<R>,
}

impl<'a, R: Read + Seek + 'a> Directory<'a, R> {
    pub(crate) fn new(archive: &'a ZipArchive<R>) -> Self {
        Self { archive }
    }

    /// Looks up an entry by its exact name.
    ///
    /// Names aren't normalized: `foo/bar` and `foo//bar` are different entries,
    /// and `dir` won't find `dir/`.
    /// If several entries share a name, the first one in the archive wins.
    pub fn entry(&self, name: &str) -> Option<Entry<'a, R>> {
        self.archive
            .by_name(name)
            .map(|metadata| Entry::new(self.archive, metadata))
    }

    /// Like [`entry()`](Self::entry), but a missing name is an error.
    pub fn lookup(&self, name: &str) -> ZipResult<Entry<'a, R>> {
        self.entry(name)
            .ok_or_else(|| ZipError::NoSuchFile(Utf8PathBuf::from(name)))
    }

    /// Returns every entry, in the order the central directory lists them.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'a, R>> + 'a {
        let archive = self.archive;
        archive
            .entries()
            .iter()
            .map(move |metadata| Entry::new(archive, metadata))
    }

    /// Returns every file entry (skipping directories),
    /// in the order the central directory lists them.
    pub fn files(&self) -> impl Iterator<Item = Entry<'a, R>> + 'a {
        self.entries().filter(|e| e.is_file())
    }
}

impl<R> Node for Directory<'_, R> {
    fn is_file(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        ""
    }
}

/// A file or directory entry in the archive
pub struct Entry<'a, R> {
    archive: &'a ZipArchive<R>,
    metadata: &'a FileMetadata,
}

// Derives would needlessly require R: Clone
impl<R> Clone for Entry<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Entry<'_, R> {}

impl<'a, R: Read + Seek> Entry<'a, R> {
    fn new(archive: &'a ZipArchive<R>, metadata: &'a FileMetadata) -> Self {
        Self { archive, metadata }
    }

    /// Reads and decompresses the entry.
    pub fn try_data(&self) -> ZipResult<Vec<u8>> {
        self.archive.read(self.metadata)
    }

    /// Reads and decompresses the entry, or returns no bytes if that fails.
    /// (Failures are logged.)
    pub fn data(&self) -> Vec<u8> {
        self.archive.data(self.metadata)
    }
}

impl<'a, R> Entry<'a, R> {
    /// The entry's metadata, straight from the archive's index
    pub fn metadata(&self) -> &'a FileMetadata {
        self.metadata
    }
}

impl<R> Node for Entry<'_, R> {
    fn is_file(&self) -> bool {
        self.metadata.is_file()
    }

    fn name(&self) -> &str {
        self.metadata.name()
    }
}

impl<R> std::fmt::Debug for Entry<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Entry").field(self.metadata).finish()
    }
}
