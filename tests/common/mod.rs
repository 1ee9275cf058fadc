//! Builds small archives byte by byte, so tests can produce exactly the
//! layouts they want to exercise (including ones no zip tool would write).

#![allow(dead_code)]

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

const LOCAL_FILE_HEADER_MAGIC: u32 = 0x04034b50;
const CENTRAL_DIRECTORY_MAGIC: u32 = 0x02014b50;
const DATA_DESCRIPTOR_MAGIC: u32 = 0x08074b50;
const ZIP64_EOCDR_MAGIC: u32 = 0x06064b50;
const ZIP64_EOCDR_LOCATOR_MAGIC: u32 = 0x07064b50;
const EOCDR_MAGIC: u32 = 0x06054b50;

const SIZE_SENTINEL: u32 = 0xFFFF_FFFF;

/// 2021-03-14 15:09:26
pub const MSDOS_TIME: u16 = (15 << 11) | (9 << 5) | (26 / 2);
pub const MSDOS_DATE: u16 = ((2021 - 1980) << 9) | (3 << 5) | 14;

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One entry to put in an archive
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub deflate: bool,
    /// Set bit 3 and put the sizes in a trailing data descriptor.
    pub streamed: bool,
    /// Write the descriptor's optional signature.
    pub descriptor_signature: bool,
    /// Use 0xFFFFFFFF sentinels and a Zip64 extra field for sizes and offsets.
    pub zip64: bool,
    /// Set bit 11
    pub utf8: bool,
    pub encrypted: bool,
    pub unicode_path: Option<String>,
    /// Appended as-is to the central directory's extra field
    pub raw_central_extra: Vec<u8>,
    pub disk_number: u16,
    pub comment: Vec<u8>,
}

impl FileSpec {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            deflate: false,
            streamed: false,
            descriptor_signature: true,
            zip64: false,
            utf8: false,
            encrypted: false,
            unicode_path: None,
            raw_central_extra: Vec::new(),
            disk_number: 0,
            comment: Vec::new(),
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            deflate: true,
            ..Self::stored(name, data)
        }
    }

    pub fn dir(name: &str) -> Self {
        Self::stored(name, b"")
    }

    pub fn streamed(self) -> Self {
        Self {
            streamed: true,
            ..self
        }
    }

    pub fn zip64(self) -> Self {
        Self { zip64: true, ..self }
    }

    pub fn utf8(self) -> Self {
        Self { utf8: true, ..self }
    }

    fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.encrypted {
            flags |= 1;
        }
        if self.streamed {
            flags |= 1 << 3;
        }
        if self.utf8 {
            flags |= 1 << 11;
        }
        flags
    }

    fn method(&self) -> u16 {
        if self.deflate {
            8
        } else {
            0
        }
    }
}

/// Where the builder put an entry
#[derive(Debug, Clone, Copy)]
pub struct Written {
    pub header_offset: u64,
    pub data_pos: u64,
    pub compressed_len: u64,
}

/// Trailer fields to write instead of the ones the builder works out
#[derive(Debug, Default, Clone, Copy)]
struct TrailerOverrides {
    disks: Option<(u32, u32)>,
    entries: Option<(u64, u64)>,
}

#[derive(Debug, Default)]
pub struct ZipBuilder {
    bytes: Vec<u8>,
    /// One central directory record per entry
    central: Vec<Vec<u8>>,
    reverse_central_directory: bool,
    entries: u64,
    written: Vec<Written>,
    comment: Vec<u8>,
    zip64_extensible_data: Option<Vec<u8>>,
    eocdr: TrailerOverrides,
    zip64_eocdr: TrailerOverrides,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Writes a Zip64 end of central directory record (and locator)
    /// with the given extensible data.
    pub fn zip64_trailer(mut self, extensible_data: &[u8]) -> Self {
        self.zip64_extensible_data = Some(extensible_data.to_vec());
        self
    }

    /// Lists entries in the central directory in the opposite order
    /// from where their local headers sit in the file.
    pub fn reverse_central_directory(mut self) -> Self {
        self.reverse_central_directory = true;
        self
    }

    /// Writes the given (this disk, disk with the central directory)
    /// into the End of central directory record.
    pub fn eocdr_disks(mut self, disk: u16, central_directory_disk: u16) -> Self {
        self.eocdr.disks = Some((disk as u32, central_directory_disk as u32));
        self
    }

    /// Writes the given (entries on this disk, total entries)
    /// into the End of central directory record.
    pub fn eocdr_entries(mut self, on_this_disk: u16, total: u16) -> Self {
        self.eocdr.entries = Some((on_this_disk as u64, total as u64));
        self
    }

    /// Like [`eocdr_disks()`](Self::eocdr_disks), for the Zip64 record
    pub fn zip64_disks(mut self, disk: u32, central_directory_disk: u32) -> Self {
        self.zip64_eocdr.disks = Some((disk, central_directory_disk));
        self
    }

    /// Like [`eocdr_entries()`](Self::eocdr_entries), for the Zip64 record
    pub fn zip64_entries(mut self, on_this_disk: u64, total: u64) -> Self {
        self.zip64_eocdr.entries = Some((on_this_disk, total));
        self
    }

    /// Puts bytes in the file that no record points to.
    pub fn junk(mut self, junk: &[u8]) -> Self {
        self.bytes.extend_from_slice(junk);
        self
    }

    pub fn file(mut self, spec: FileSpec) -> Self {
        self.add(&spec);
        self
    }

    pub fn written(&self) -> &[Written] {
        &self.written
    }

    fn add(&mut self, spec: &FileSpec) {
        let crc = crc32fast::hash(&spec.data);
        let payload = if spec.deflate {
            deflate(&spec.data)
        } else {
            spec.data.clone()
        };
        let size = spec.data.len() as u64;
        let compressed_size = payload.len() as u64;
        let header_offset = self.bytes.len() as u64;

        // Local header
        let mut local_extra = Vec::new();
        let (local_crc, local_compressed, local_size) = if spec.streamed {
            if spec.zip64 {
                // Zeroed, but still marks the descriptor as 64-bit.
                extra_record(&mut local_extra, 0x0001, &[0; 16]);
            }
            (0, 0, 0)
        } else if spec.zip64 {
            let mut zip64 = Vec::new();
            zip64.extend_from_slice(&size.to_le_bytes());
            zip64.extend_from_slice(&compressed_size.to_le_bytes());
            extra_record(&mut local_extra, 0x0001, &zip64);
            (crc, SIZE_SENTINEL, SIZE_SENTINEL)
        } else {
            (crc, compressed_size as u32, size as u32)
        };
        let version = if spec.zip64 { 45 } else { 20 };

        let b = &mut self.bytes;
        put_u32(b, LOCAL_FILE_HEADER_MAGIC);
        put_u16(b, version);
        put_u16(b, spec.flags());
        put_u16(b, spec.method());
        put_u16(b, MSDOS_TIME);
        put_u16(b, MSDOS_DATE);
        put_u32(b, local_crc);
        put_u32(b, local_compressed);
        put_u32(b, local_size);
        put_u16(b, spec.name.len() as u16);
        put_u16(b, local_extra.len() as u16);
        b.extend_from_slice(&spec.name);
        b.extend_from_slice(&local_extra);
        let data_pos = b.len() as u64;
        b.extend_from_slice(&payload);

        if spec.streamed {
            if spec.descriptor_signature {
                put_u32(b, DATA_DESCRIPTOR_MAGIC);
            }
            put_u32(b, crc);
            if spec.zip64 {
                put_u64(b, compressed_size);
                put_u64(b, size);
            } else {
                put_u32(b, compressed_size as u32);
                put_u32(b, size as u32);
            }
        }

        // Central directory entry
        let mut central_extra = Vec::new();
        let (central_compressed, central_size, central_offset) = if spec.zip64 {
            let mut zip64 = Vec::new();
            zip64.extend_from_slice(&size.to_le_bytes());
            zip64.extend_from_slice(&compressed_size.to_le_bytes());
            zip64.extend_from_slice(&header_offset.to_le_bytes());
            extra_record(&mut central_extra, 0x0001, &zip64);
            (SIZE_SENTINEL, SIZE_SENTINEL, SIZE_SENTINEL)
        } else {
            (compressed_size as u32, size as u32, header_offset as u32)
        };
        if let Some(unicode) = &spec.unicode_path {
            let mut up = vec![1];
            up.extend_from_slice(&crc32fast::hash(&spec.name).to_le_bytes());
            up.extend_from_slice(unicode.as_bytes());
            extra_record(&mut central_extra, 0x7075, &up);
        }
        central_extra.extend_from_slice(&spec.raw_central_extra);

        let mut record = Vec::new();
        let c = &mut record;
        put_u32(c, CENTRAL_DIRECTORY_MAGIC);
        put_u16(c, 0x031e); // Unix, 3.0
        put_u16(c, version);
        put_u16(c, spec.flags());
        put_u16(c, spec.method());
        put_u16(c, MSDOS_TIME);
        put_u16(c, MSDOS_DATE);
        put_u32(c, crc);
        put_u32(c, central_compressed);
        put_u32(c, central_size);
        put_u16(c, spec.name.len() as u16);
        put_u16(c, central_extra.len() as u16);
        put_u16(c, spec.comment.len() as u16);
        put_u16(c, spec.disk_number);
        put_u16(c, 0); // internal attributes
        put_u32(c, 0o100644 << 16); // external attributes
        put_u32(c, central_offset);
        c.extend_from_slice(&spec.name);
        c.extend_from_slice(&central_extra);
        c.extend_from_slice(&spec.comment);
        self.central.push(record);

        self.entries += 1;
        self.written.push(Written {
            header_offset,
            data_pos,
            compressed_len: compressed_size,
        });
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.reverse_central_directory {
            self.central.reverse();
        }
        let mut b = self.bytes;
        let cd_offset = b.len() as u64;
        let central = self.central.concat();
        let cd_size = central.len() as u64;
        b.extend_from_slice(&central);

        let zip64 = self.zip64_extensible_data.is_some();
        if let Some(extensible_data) = &self.zip64_extensible_data {
            let zip64_eocdr_offset = b.len() as u64;
            put_u32(&mut b, ZIP64_EOCDR_MAGIC);
            put_u64(&mut b, 44 + extensible_data.len() as u64);
            put_u16(&mut b, 45);
            put_u16(&mut b, 45);
            let (disk, cd_disk) = self.zip64_eocdr.disks.unwrap_or((0, 0));
            let (on_this_disk, total) = self
                .zip64_eocdr
                .entries
                .unwrap_or((self.entries, self.entries));
            put_u32(&mut b, disk);
            put_u32(&mut b, cd_disk);
            put_u64(&mut b, on_this_disk);
            put_u64(&mut b, total);
            put_u64(&mut b, cd_size);
            put_u64(&mut b, cd_offset);
            b.extend_from_slice(extensible_data);

            put_u32(&mut b, ZIP64_EOCDR_LOCATOR_MAGIC);
            put_u32(&mut b, 0);
            put_u64(&mut b, zip64_eocdr_offset);
            put_u32(&mut b, 1);
        }

        let entries = if zip64 { 0xFFFF } else { self.entries };
        let (disk, cd_disk) = self.eocdr.disks.unwrap_or((0, 0));
        let (on_this_disk, total) = self.eocdr.entries.unwrap_or((entries, entries));
        put_u32(&mut b, EOCDR_MAGIC);
        put_u16(&mut b, disk as u16);
        put_u16(&mut b, cd_disk as u16);
        put_u16(&mut b, on_this_disk as u16);
        put_u16(&mut b, total as u16);
        put_u32(&mut b, if zip64 { SIZE_SENTINEL } else { cd_size as u32 });
        put_u32(&mut b, if zip64 { SIZE_SENTINEL } else { cd_offset as u32 });
        put_u16(&mut b, self.comment.len() as u16);
        b.extend_from_slice(&self.comment);
        b
    }
}

pub fn extra_record(extra: &mut Vec<u8>, id: u16, data: &[u8]) {
    put_u16(extra, id);
    put_u16(extra, data.len() as u16);
    extra.extend_from_slice(data);
}

fn put_u16(b: &mut Vec<u8>, v: u16) {
    b.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(b: &mut Vec<u8>, v: u32) {
    b.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(b: &mut Vec<u8>, v: u64) {
    b.extend_from_slice(&v.to_le_bytes());
}
