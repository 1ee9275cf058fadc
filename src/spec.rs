//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`read`]: ../read/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::io::{Read, Seek};

use chrono::{NaiveDate, NaiveDateTime};
use codepage_437::*;
use log::*;

use crate::cursor::ByteCursor;
use crate::result::*;
use crate::scan::{self, Direction, SIGNATURE_LEN};
use crate::source::{read_at, read_exact_vec};

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
pub const EOCDR_MAGIC: u32 = 0x06054b50;
/// Zip64 end of central directory magic number
pub const ZIP64_EOCDR_MAGIC: u32 = 0x06064b50;
/// Zip64 end of central directory locator magic number
pub const ZIP64_EOCDR_LOCATOR_MAGIC: u32 = 0x07064b50;
/// Central directory magic number
pub const CENTRAL_DIRECTORY_MAGIC: u32 = 0x02014b50;
/// Local file header magic number
pub const LOCAL_FILE_HEADER_MAGIC: u32 = 0x04034b50;
/// Data descriptor magic number
pub const DATA_DESCRIPTOR_MAGIC: u32 = 0x08074b50;

/// Zip64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Info-ZIP Unicode Path extra field
const UNICODE_PATH_EXTRA_ID: u16 = 0x7075;

/// The archive comment's length is a u16.
const MAX_COMMENT_LENGTH: u64 = u16::MAX as u64;

/// Size fields set to this live in the Zip64 extra field instead.
const SIZE_SENTINEL: u32 = u32::MAX;
/// Ditto for a central directory entry's disk number
const DISK_SENTINEL: u16 = u16::MAX;

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const FIXED_SIZE: u64 = 22;

    /// Parses the record from `eocdr`, which runs from its signature
    /// to the end of the archive.
    pub fn parse(eocdr: &[u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        // .ZIP file comment       (variable size)
        let mut cursor = ByteCursor::new(eocdr);
        if cursor.read_u32_le()? != EOCDR_MAGIC {
            return Err(ZipError::InvalidArchive(
                "Invalid End Of Central Directory Record",
            ));
        }
        let disk_number = cursor.read_u16_le()?;
        let disk_with_central_directory = cursor.read_u16_le()?;
        let entries_on_this_disk = cursor.read_u16_le()?;
        let entries = cursor.read_u16_le()?;
        let central_directory_size = cursor.read_u32_le()?;
        let central_directory_offset = cursor.read_u32_le()?;
        let comment_length = cursor.read_u16_le()?;
        let file_comment = cursor
            .read_bytes(comment_length as usize)
            .map_err(|_| {
                ZipError::InvalidArchive("End Of Central Directory Record comment runs past EOF")
            })?
            .to_vec();

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }
}

/// Searches backward from the end of the archive to find the
/// End of central directory record, returning its position and contents.
///
/// It should be right at the end of the file,
/// but its variable-length comment means we can't jump to a known offset.
/// Look from the last place it could fit to the first,
/// skipping over "signatures" that turn out to be part of a comment.
pub fn find_eocdr<R: Read + Seek>(
    source: &mut R,
    source_len: u64,
) -> ZipResult<(u64, EndOfCentralDirectory)> {
    let last_possible = source_len
        .checked_sub(EndOfCentralDirectory::FIXED_SIZE)
        .ok_or(ZipError::InvalidArchive(
            "Too small for an End Of Central Directory Record",
        ))?;
    let first_possible = last_possible.saturating_sub(MAX_COMMENT_LENGTH);

    let mut window_end = last_possible + SIGNATURE_LEN;
    while let Some(posit) = scan::find_signature(
        source,
        first_possible..window_end,
        EOCDR_MAGIC,
        Direction::Backward,
    )? {
        let tail = read_at(source, posit, source_len - posit)?;
        match EndOfCentralDirectory::parse(&tail) {
            Ok(eocdr) => return Ok((posit, eocdr)),
            Err(e) => debug!("Skipping candidate EOCDR at {}: {}", posit, e),
        }
        // Keep looking for a match that starts before this one.
        window_end = posit + SIGNATURE_LEN - 1;
    }
    Err(ZipError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Data from the Zip64 end of central directory locator
///
/// This should immediately precede the End of central directory record
/// on Zip64 files and tell us where to find the Zip64 end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub const SIZE: u64 = 20;

    /// Returns `None` if the bytes aren't a locator at all.
    pub fn parse(locator: &[u8]) -> ZipResult<Option<Self>> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        let mut cursor = ByteCursor::new(locator);
        if cursor.read_u32_le()? != ZIP64_EOCDR_LOCATOR_MAGIC {
            return Ok(None);
        }
        let disk_with_central_directory = cursor.read_u32_le()?;
        let zip64_eocdr_offset = cursor.read_u64_le()?;
        let disks = cursor.read_u32_le()?;

        Ok(Some(Self {
            disk_with_central_directory,
            zip64_eocdr_offset,
            disks,
        }))
    }
}

/// Data from the Zip64 end of central directory record
///
/// Holds 64-bit versions of the End of central directory record's fields,
/// which override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub extensible_data: Vec<u8>,
}

impl Zip64EndOfCentralDirectory {
    /// Signature and the record size field
    const LEADING_SIZE: u64 = 12;
    /// Everything the record size field counts, minus the extensible data
    const FIXED_SIZE: u64 = 44;

    pub fn read_from<R: Read>(source: &mut R) -> ZipResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)
        let fixed = read_exact_vec(source, Self::LEADING_SIZE + Self::FIXED_SIZE)?;
        let mut cursor = ByteCursor::new(&fixed);
        if cursor.read_u32_le()? != ZIP64_EOCDR_MAGIC {
            return Err(ZipError::InvalidArchive(
                "Invalid Zip64 End Of Central Directory Record",
            ));
        }
        let eocdr_size = cursor.read_u64_le()?;
        let source_version = cursor.read_u16_le()?;
        let minimum_extract_version = cursor.read_u16_le()?;
        let disk_number = cursor.read_u32_le()?;
        let disk_with_central_directory = cursor.read_u32_le()?;
        let entries_on_this_disk = cursor.read_u64_le()?;
        let entries = cursor.read_u64_le()?;
        let central_directory_size = cursor.read_u64_le()?;
        let central_directory_offset = cursor.read_u64_le()?;

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD be the size of the remaining
        // record and SHOULD NOT include the leading 12 bytes.
        //
        // Size = SizeOfFixedFields + SizeOfVariableData - 12.
        let extensible_data_length =
            eocdr_size
                .checked_sub(Self::FIXED_SIZE)
                .ok_or(ZipError::InvalidArchive(
                    "Invalid extensible data length in Zip64 End Of Central Directory Record",
                ))?;
        let extensible_data = read_exact_vec(source, extensible_data_length)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            extensible_data,
        })
    }
}

/// The archive's trailer: the End of central directory record,
/// plus the Zip64 records that extend it, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    eocdr: EndOfCentralDirectory,
    zip64_locator: Option<Zip64EndOfCentralDirectoryLocator>,
    zip64_eocdr: Option<Zip64EndOfCentralDirectory>,
}

impl Trailer {
    /// Finds and parses the trailer at the back of the archive.
    pub(crate) fn locate<R: Read + Seek>(source: &mut R, source_len: u64) -> ZipResult<Self> {
        let (eocdr_posit, eocdr) = find_eocdr(source, source_len)?;
        trace!("{:?} at {}", eocdr, eocdr_posit);

        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        // The Zip64 locator, if any, sits right before the EOCDR.
        let locator = match eocdr_posit.checked_sub(Zip64EndOfCentralDirectoryLocator::SIZE) {
            Some(locator_posit) => {
                let bytes =
                    read_at(source, locator_posit, Zip64EndOfCentralDirectoryLocator::SIZE)?;
                Zip64EndOfCentralDirectoryLocator::parse(&bytes)?
            }
            None => None,
        };

        let zip64_eocdr = match &locator {
            Some(locator) => {
                trace!("{:?}", locator);
                source.seek(std::io::SeekFrom::Start(locator.zip64_eocdr_offset))?;
                let zip64_eocdr = Zip64EndOfCentralDirectory::read_from(source)?;
                trace!("{:?}", zip64_eocdr);

                if zip64_eocdr.disk_number != zip64_eocdr.disk_with_central_directory {
                    return Err(ZipError::UnsupportedArchive(format!(
                        "No support for multi-disk archives: disk ({}) != disk with zip64 central directory ({})",
                        zip64_eocdr.disk_number, zip64_eocdr.disk_with_central_directory
                    )));
                }
                if zip64_eocdr.entries != zip64_eocdr.entries_on_this_disk {
                    return Err(ZipError::UnsupportedArchive(format!(
                        "No support for multi-disk archives: zip64 entries ({}) != entries this disk ({})",
                        zip64_eocdr.entries, zip64_eocdr.entries_on_this_disk
                    )));
                }
                Some(zip64_eocdr)
            }
            None => None,
        };

        Ok(Self {
            eocdr,
            zip64_locator: locator,
            zip64_eocdr,
        })
    }

    /// True if the archive carries a Zip64 end of central directory record
    pub fn is_zip64(&self) -> bool {
        self.zip64_eocdr.is_some()
    }

    /// The disk the archive (and its central directory) lives on
    pub fn disk_number(&self) -> u32 {
        match &self.zip64_eocdr {
            Some(z) => z.disk_number,
            None => self.eocdr.disk_number as u32,
        }
    }

    /// The number of entries in the central directory
    pub fn entries(&self) -> u64 {
        match &self.zip64_eocdr {
            Some(z) => z.entries,
            None => self.eocdr.entries as u64,
        }
    }

    pub fn central_directory_size(&self) -> u64 {
        match &self.zip64_eocdr {
            Some(z) => z.central_directory_size,
            None => self.eocdr.central_directory_size as u64,
        }
    }

    pub fn central_directory_offset(&self) -> u64 {
        match &self.zip64_eocdr {
            Some(z) => z.central_directory_offset,
            None => self.eocdr.central_directory_offset as u64,
        }
    }

    /// The archive comment
    pub fn comment(&self) -> &[u8] {
        &self.eocdr.file_comment
    }

    /// The Zip64 extensible data sector, kept as-is.
    pub fn extensible_data(&self) -> Option<&[u8]> {
        self.zip64_eocdr
            .as_ref()
            .map(|z| z.extensible_data.as_slice())
    }

    /// Where the Zip64 end of central directory record was found, if anywhere
    pub fn zip64_eocdr_offset(&self) -> Option<u64> {
        self.zip64_locator.as_ref().map(|l| l.zip64_eocdr_offset)
    }
}

/// Which fixed-size fields of a header were set to their "see Zip64" sentinel.
///
/// The Zip64 extra field only contains values for these, in this order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Sentinels {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_number: bool,
}

/// Data from the Zip64 extended information extra field
///
/// Only the fields whose 32-bit counterparts were sentinels are present.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Zip64ExtendedInfo {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

impl Zip64ExtendedInfo {
    fn parse(data: &[u8], sentinels: Zip64Sentinels) -> ZipResult<Self> {
        // 4.5.3 -Zip64 Extended Information Extra Field (0x0001):
        //
        // Value      Size       Description
        // -----      ----       -----------
        // 0x0001     2 bytes    Tag for this "extra" block type
        // Size       2 bytes    Size of this "extra" block
        // Original
        // Size       8 bytes    Original uncompressed file size
        // Compressed
        // Size       8 bytes    Size of compressed data
        // Relative Header
        // Offset     8 bytes    Offset of local header record
        // Disk Start
        // Number     4 bytes    Number of the disk on which
        //                       this file starts
        //
        // The order of the fields in the zip64 extended
        // information record is fixed, but the fields MUST
        // only appear if the corresponding Local or Central
        // directory record field is set to 0xFFFF or 0xFFFFFFFF.
        let too_short = |_| ZipError::InvalidArchive("Zip64 extra field is too short");
        let mut cursor = ByteCursor::new(data);
        let mut info = Self::default();
        if sentinels.uncompressed_size {
            info.uncompressed_size = Some(cursor.read_u64_le().map_err(too_short)?);
        }
        if sentinels.compressed_size {
            info.compressed_size = Some(cursor.read_u64_le().map_err(too_short)?);
        }
        if sentinels.header_offset {
            info.header_offset = Some(cursor.read_u64_le().map_err(too_short)?);
        }
        if sentinels.disk_number {
            info.disk_number = Some(cursor.read_u32_le().map_err(too_short)?);
        }
        Ok(info)
    }
}

/// Data from the Info-ZIP Unicode Path extra field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePath {
    /// CRC-32 of the header's (non-Unicode) file name,
    /// so we can tell if a tool changed one and not the other.
    pub name_crc32: u32,
    /// The UTF-8 version of the file name
    pub name: Vec<u8>,
}

impl UnicodePath {
    /// Returns `None` for versions we don't understand.
    fn parse(data: &[u8]) -> Option<Self> {
        // 4.6.9 -Info-ZIP Unicode Path Extra Field (0x7075):
        //
        // Value         Size       Description
        // -----         ----       -----------
        // 0x7075        Short      tag for this extra block type ("up")
        // TSize         Short      total data size for this block
        // Version       1 byte     version of this extra field, currently 1
        // NameCRC32     4 bytes    File Name Field CRC32 Checksum
        // UnicodeName   Variable   UTF-8 version of the entry File Name
        let mut cursor = ByteCursor::new(data);
        if cursor.read_u8().ok()? != 1 {
            return None;
        }
        let name_crc32 = cursor.read_u32_le().ok()?;
        let name = cursor.rest().to_vec();
        Some(Self { name_crc32, name })
    }

    /// Returns the Unicode name if it still describes `legacy_name`.
    fn name_for(&self, legacy_name: &[u8]) -> Option<&str> {
        if self.name.is_empty() {
            return None;
        }
        if crc32fast::hash(legacy_name) != self.name_crc32 {
            warn!("Ignoring Unicode path whose CRC doesn't match its file name");
            return None;
        }
        match std::str::from_utf8(&self.name) {
            Ok(name) => Some(name),
            Err(e) => {
                warn!("Ignoring Unicode path that isn't UTF-8: {}", e);
                None
            }
        }
    }
}

/// A record from an extra field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Zip64(Zip64ExtendedInfo),
    UnicodePath(UnicodePath),
    /// Anything else, kept as raw bytes
    Unknown { id: u16, data: Vec<u8> },
}

/// Parses the "extra fields" found in central directory entries
/// and local file headers.
fn parse_extra_fields(extra_field: &[u8], sentinels: Zip64Sentinels) -> ZipResult<Vec<ExtraField>> {
    // 4.5.1 In order to allow different programs and different types
    // of information to be stored in the 'extra' field in .ZIP
    // files, the following structure MUST be used for all
    // programs storing data in this field:
    //
    //     header1+data1 + header2+data2 . . .
    //
    // Each header MUST consist of:
    //
    //     Header ID - 2 bytes
    //     Data Size - 2 bytes
    let overrun = |_| ZipError::InvalidArchive("Extra field record overruns the extra field");
    let mut cursor = ByteCursor::new(extra_field);
    let mut fields = Vec::new();
    while !cursor.is_empty() {
        let id = cursor.read_u16_le().map_err(overrun)?;
        let len = cursor.read_u16_le().map_err(overrun)?;
        let data = cursor.read_bytes(len as usize).map_err(overrun)?;

        let field = match id {
            ZIP64_EXTRA_ID => ExtraField::Zip64(Zip64ExtendedInfo::parse(data, sentinels)?),
            UNICODE_PATH_EXTRA_ID => match UnicodePath::parse(data) {
                Some(path) => ExtraField::UnicodePath(path),
                None => ExtraField::Unknown {
                    id,
                    data: data.to_vec(),
                },
            },
            _ => ExtraField::Unknown {
                id,
                data: data.to_vec(),
            },
        };
        fields.push(field);
    }
    Ok(fields)
}

fn find_zip64(fields: &[ExtraField]) -> Option<&Zip64ExtendedInfo> {
    fields.iter().find_map(|f| match f {
        ExtraField::Zip64(z) => Some(z),
        _ => None,
    })
}

fn find_unicode_path(fields: &[ExtraField]) -> Option<&UnicodePath> {
    fields.iter().find_map(|f| match f {
        ExtraField::UnicodePath(u) => Some(u),
        _ => None,
    })
}

/// Data from a central directory entry
///
/// Each of these records contians information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryEntry {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: Vec<u8>,
    pub extra_fields: Vec<ExtraField>,
    pub file_comment: Vec<u8>,
}

impl CentralDirectoryEntry {
    pub const FIXED_SIZE: u64 = 46;

    pub fn read_from<R: Read>(source: &mut R) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        // [central directory header 1]
        // .
        // .
        // .
        // [central directory header n]
        // [digital signature]
        //
        // File header:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        let fixed = read_exact_vec(source, Self::FIXED_SIZE)?;
        let mut entry = ByteCursor::new(&fixed);
        if entry.read_u32_le()? != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid central directory entry"));
        }
        let source_version = entry.read_u16_le()?;
        let minimum_extract_version = entry.read_u16_le()?;
        let flags = entry.read_u16_le()?;
        let compression_method = entry.read_u16_le()?;
        let last_modified_time = entry.read_u16_le()?;
        let last_modified_date = entry.read_u16_le()?;
        let crc32 = entry.read_u32_le()?;
        let compressed_size = entry.read_u32_le()?;
        let uncompressed_size = entry.read_u32_le()?;
        let path_length = entry.read_u16_le()?;
        let extra_field_length = entry.read_u16_le()?;
        let file_comment_length = entry.read_u16_le()?;
        let disk_number = entry.read_u16_le()?;
        let internal_file_attributes = entry.read_u16_le()?;
        let external_file_attributes = entry.read_u32_le()?;
        let header_offset = entry.read_u32_le()?;

        let path = read_exact_vec(source, path_length as u64)?;
        let extra_field = read_exact_vec(source, extra_field_length as u64)?;
        let file_comment = read_exact_vec(source, file_comment_length as u64)?;

        let sentinels = Zip64Sentinels {
            uncompressed_size: uncompressed_size == SIZE_SENTINEL,
            compressed_size: compressed_size == SIZE_SENTINEL,
            header_offset: header_offset == SIZE_SENTINEL,
            disk_number: disk_number == DISK_SENTINEL,
        };
        let extra_fields = parse_extra_fields(&extra_field, sentinels)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_fields,
            file_comment,
        })
    }

    pub fn zip64(&self) -> Option<&Zip64ExtendedInfo> {
        find_zip64(&self.extra_fields)
    }

    pub fn unicode_path(&self) -> Option<&UnicodePath> {
        find_unicode_path(&self.extra_fields)
    }

    pub fn uncompressed_size(&self) -> u64 {
        let zip64 = self.zip64().and_then(|z| z.uncompressed_size);
        zip64.unwrap_or(self.uncompressed_size as u64)
    }

    pub fn compressed_size(&self) -> u64 {
        let zip64 = self.zip64().and_then(|z| z.compressed_size);
        zip64.unwrap_or(self.compressed_size as u64)
    }

    pub fn header_offset(&self) -> u64 {
        let zip64 = self.zip64().and_then(|z| z.header_offset);
        zip64.unwrap_or(self.header_offset as u64)
    }

    pub fn disk_number(&self) -> u32 {
        let zip64 = self.zip64().and_then(|z| z.disk_number);
        zip64.unwrap_or(self.disk_number as u32)
    }

    /// Decodes the entry's file name.
    ///
    /// UTF-8 if the header says so, otherwise a matching Unicode Path
    /// extra field, otherwise CP437.
    pub fn decode_path(&self) -> ZipResult<String> {
        if is_utf8(self.flags) {
            let utf8 = std::str::from_utf8(&self.path).map_err(ZipError::Encoding)?;
            return Ok(utf8.to_owned());
        }
        if let Some(name) = self.unicode_path().and_then(|u| u.name_for(&self.path)) {
            return Ok(name.to_owned());
        }
        let str_cow: Cow<str> = Cow::borrow_from_cp437(self.path.as_slice(), &CP437_CONTROL);
        Ok(str_cow.into_owned())
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumped to be CP437.
pub fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    flags & (1 << 11) != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
pub fn is_encrypted(flags: u16) -> bool {
    // Bit 0: If set, indicates that the file is encrypted
    flags & 1 != 0
}

/// Extracts the "sizes are in a data descriptor" bit from the 16-bit flags field.
pub fn is_streamed(flags: u16) -> bool {
    // Bit 3: If this bit is set, the fields crc-32, compressed
    //        size and uncompressed size are set to zero in the
    //        local header.  The correct values are put in the
    //        data descriptor immediately following the compressed
    //        data.
    flags & (1 << 3) != 0
}

/// Converts an MS-DOS timestamp, or returns `None` if it names an impossible date.
pub fn parse_msdos(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// It's the authority on how the data is compressed,
/// and on its sizes unless they're deferred to a data descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: Vec<u8>,
    pub extra_fields: Vec<ExtraField>,
    extra_field_length: u16,
}

impl LocalFileHeader {
    pub const FIXED_SIZE: u64 = 30;

    pub fn read_from<R: Read>(source: &mut R) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let fixed = read_exact_vec(source, Self::FIXED_SIZE)?;
        let mut header = ByteCursor::new(&fixed);
        if header.read_u32_le()? != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid local file header"));
        }
        let minimum_extract_version = header.read_u16_le()?;
        let flags = header.read_u16_le()?;
        let compression_method = header.read_u16_le()?;
        let last_modified_time = header.read_u16_le()?;
        let last_modified_date = header.read_u16_le()?;
        let crc32 = header.read_u32_le()?;
        let compressed_size = header.read_u32_le()?;
        let uncompressed_size = header.read_u32_le()?;
        let path_length = header.read_u16_le()?;
        let extra_field_length = header.read_u16_le()?;

        let path = read_exact_vec(source, path_length as u64)?;
        let extra_field = read_exact_vec(source, extra_field_length as u64)?;

        // 4.5.3: This entry in the Local header MUST include BOTH original
        // and compressed file size fields.
        // (...if either is a sentinel. Nothing else belongs here.)
        let sentinels = Zip64Sentinels {
            uncompressed_size: uncompressed_size == SIZE_SENTINEL,
            compressed_size: compressed_size == SIZE_SENTINEL,
            ..Default::default()
        };
        let extra_fields = parse_extra_fields(&extra_field, sentinels)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_fields,
            extra_field_length,
        })
    }

    /// How many bytes the header takes up, name and extra field included.
    /// The entry's data starts right after.
    pub fn size_in_file(&self) -> u64 {
        Self::FIXED_SIZE + self.path.len() as u64 + self.extra_field_length as u64
    }

    pub fn zip64(&self) -> Option<&Zip64ExtendedInfo> {
        find_zip64(&self.extra_fields)
    }

    /// True if this header carries a Zip64 extra field,
    /// which makes its data descriptor (if any) use 64-bit sizes.
    pub fn has_zip64(&self) -> bool {
        self.zip64().is_some()
    }

    pub fn uncompressed_size(&self) -> u64 {
        let zip64 = self.zip64().and_then(|z| z.uncompressed_size);
        zip64.unwrap_or(self.uncompressed_size as u64)
    }

    pub fn compressed_size(&self) -> u64 {
        let zip64 = self.zip64().and_then(|z| z.compressed_size);
        zip64.unwrap_or(self.compressed_size as u64)
    }
}

/// Data from a data descriptor, which follows a streamed entry's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// The size of the descriptor, minus its (optional) signature
    pub fn size_without_signature(zip64: bool) -> u64 {
        if zip64 {
            20
        } else {
            12
        }
    }

    /// The size of the descriptor, signature included
    pub fn size_in_file(zip64: bool) -> u64 {
        SIGNATURE_LEN + Self::size_without_signature(zip64)
    }

    /// Reads a descriptor that starts with its signature.
    pub fn read_from<R: Read>(source: &mut R, zip64: bool) -> ZipResult<Self> {
        // 4.3.9  Data descriptor:
        //
        //     crc-32                          4 bytes
        //     compressed size                 4 bytes
        //     uncompressed size               4 bytes
        //
        // 4.3.9.1 [...] For ZIP64(tm) format archives, the compressed
        // and uncompressed sizes are 8 bytes each.
        //
        // 4.3.9.3 Although not originally assigned a signature, the value
        // 0x08074b50 has commonly been adopted as a signature value
        // for the data descriptor record.
        let bytes = read_exact_vec(source, Self::size_in_file(zip64))?;
        let mut descriptor = ByteCursor::new(&bytes);
        if descriptor.read_u32_le()? != DATA_DESCRIPTOR_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid data descriptor"));
        }
        let crc32 = descriptor.read_u32_le()?;
        let (compressed_size, uncompressed_size) = if zip64 {
            (descriptor.read_u64_le()?, descriptor.read_u64_le()?)
        } else {
            (
                descriptor.read_u32_le()? as u64,
                descriptor.read_u32_le()? as u64,
            )
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}
