//! Raw tar header block access.
//!
//! A tar archive is a sequence of 512-byte blocks. Every entry starts with a
//! header block; the fields are ASCII octal numbers or null-terminated
//! strings at fixed offsets:
//!
//! | Offset | Size | Field     | Description                              |
//! |--------|------|-----------|------------------------------------------|
//! | 0      | 100  | name      | Entry path (null-terminated if < 100)    |
//! | 100    | 8    | mode      | File mode in octal ASCII                 |
//! | 108    | 8    | uid       | Owner user ID in octal ASCII             |
//! | 116    | 8    | gid       | Owner group ID in octal ASCII            |
//! | 124    | 12   | size      | Data section length in octal ASCII       |
//! | 136    | 12   | mtime     | Modification time (Unix epoch, octal)    |
//! | 148    | 8    | checksum  | Header checksum in octal ASCII           |
//! | 156    | 1    | typeflag  | Entry type (see [`TypeFlag`])            |
//! | 157    | 100  | linkname  | Link target for hard/symbolic links      |
//! | 257    | 6    | magic     | "ustar\0" (UStar) or "ustar " (GNU)      |
//! | 263    | 2    | version   | "00" (UStar) or " \0" (GNU)              |
//! | 345    | 155  | prefix    | UStar path prefix for long names         |
//!
//! The checksum is validated on every block; the magic/version field is
//! intentionally NOT validated because several "ustar"-family variants are
//! valid in practice. The UStar prefix is only honored when the UStar magic
//! is present, since GNU tar reuses those bytes for other fields.

use std::fmt;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of a tar block in bytes. Headers and data padding are block-sized.
pub const BLOCK_SIZE: usize = 512;

/// Magic string for UStar format headers ("ustar\0").
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Magic string for GNU tar format headers ("ustar ").
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";

/// Errors that can occur when decoding a single header block.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// An octal field contains invalid characters.
    #[error("invalid octal field: {0:?}")]
    InvalidOctal(Vec<u8>),

    /// The header checksum does not match the computed value.
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch {
        /// The checksum value stored in the header.
        stored: u64,
        /// The checksum computed from the header bytes.
        computed: u64,
    },
}

/// Result type for header decoding operations.
pub type Result<T> = std::result::Result<T, HeaderError>;

/// Raw 512-byte tar header block.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawHeader {
    /// The raw header bytes.
    pub bytes: [u8; BLOCK_SIZE],
}

impl Default for RawHeader {
    fn default() -> Self {
        Self {
            bytes: [0u8; BLOCK_SIZE],
        }
    }
}

impl fmt::Debug for RawHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHeader")
            .field("name", &truncate_null(&self.bytes[0..100]))
            .finish_non_exhaustive()
    }
}

/// Entry type flag stored at offset 156.
///
/// Exactly the values needed to round-trip Windows container layer archives
/// are distinguished; everything else lands in [`TypeFlag::Other`] and is
/// skipped by the reader rather than rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeFlag {
    /// Regular file (type '0').
    RegularFile,
    /// Regular file, legacy pre-POSIX encoding (type '\0').
    OldNormal,
    /// Hard link to another entry in the archive (type '1').
    HardLink,
    /// Symbolic link (type '2').
    Symlink,
    /// Directory (type '5').
    Directory,
    /// GNU long-name extension carrying the next entry's path (type 'L').
    GnuLongName,
    /// GNU volume header (type 'V').
    GnuVolumeHeader,
    /// POSIX global extended header (type 'g').
    PosixGlobalHeader,
    /// POSIX extended (local) header, aka PAX (type 'x').
    PosixExtendedHeader,
    /// Any other type flag. Skipped, not rejected.
    Other(u8),
}

impl TypeFlag {
    /// Decode a type flag from its raw byte value.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' => TypeFlag::RegularFile,
            b'\0' => TypeFlag::OldNormal,
            b'1' => TypeFlag::HardLink,
            b'2' => TypeFlag::Symlink,
            b'5' => TypeFlag::Directory,
            b'L' => TypeFlag::GnuLongName,
            b'V' => TypeFlag::GnuVolumeHeader,
            b'g' => TypeFlag::PosixGlobalHeader,
            b'x' => TypeFlag::PosixExtendedHeader,
            other => TypeFlag::Other(other),
        }
    }

    /// Encode a type flag to its raw byte representation.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            TypeFlag::RegularFile => b'0',
            TypeFlag::OldNormal => b'\0',
            TypeFlag::HardLink => b'1',
            TypeFlag::Symlink => b'2',
            TypeFlag::Directory => b'5',
            TypeFlag::GnuLongName => b'L',
            TypeFlag::GnuVolumeHeader => b'V',
            TypeFlag::PosixGlobalHeader => b'g',
            TypeFlag::PosixExtendedHeader => b'x',
            TypeFlag::Other(b) => b,
        }
    }

    /// Returns true for the types the reader yields as entries:
    /// regular files (both encodings), hard links, symlinks, directories.
    #[must_use]
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            TypeFlag::RegularFile
                | TypeFlag::OldNormal
                | TypeFlag::HardLink
                | TypeFlag::Symlink
                | TypeFlag::Directory
        )
    }

    /// Returns true for regular file entries (either encoding).
    #[must_use]
    pub fn is_file(self) -> bool {
        matches!(self, TypeFlag::RegularFile | TypeFlag::OldNormal)
    }

    /// Returns true for link-type entries (hard links and symlinks).
    #[must_use]
    pub fn is_link(self) -> bool {
        matches!(self, TypeFlag::HardLink | TypeFlag::Symlink)
    }
}

impl From<u8> for TypeFlag {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

/// High-level view of a raw header block with field accessors.
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct Header {
    raw: RawHeader,
}

impl Header {
    /// Create an all-zero header with UStar magic and version set.
    #[must_use]
    pub fn new_ustar() -> Self {
        let mut header = Self {
            raw: RawHeader::default(),
        };
        header.raw.bytes[257..263].copy_from_slice(USTAR_MAGIC);
        header.raw.bytes[263..265].copy_from_slice(b"00");
        header
    }

    /// View exactly 512 bytes as a header, without copying.
    #[must_use]
    pub fn from_bytes_exact(bytes: &[u8; BLOCK_SIZE]) -> &Header {
        let raw = RawHeader::ref_from_bytes(bytes).expect("size is correct");
        zerocopy::transmute_ref!(raw)
    }

    /// Get a reference to the underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.raw.bytes
    }

    /// Get a mutable reference to the underlying bytes.
    pub fn as_mut_bytes(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.raw.bytes
    }

    /// Check if this header uses the UStar format.
    #[must_use]
    pub fn is_ustar(&self) -> bool {
        self.raw.bytes[257..263] == *USTAR_MAGIC
    }

    /// Check if this header uses the GNU tar format.
    #[must_use]
    pub fn is_gnu(&self) -> bool {
        self.raw.bytes[257..263] == *GNU_MAGIC
    }

    /// Get the entry type flag.
    #[must_use]
    pub fn type_flag(&self) -> TypeFlag {
        TypeFlag::from_byte(self.raw.bytes[156])
    }

    /// Get the data section length in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::InvalidOctal`] if the size field is not valid.
    pub fn entry_size(&self) -> Result<u64> {
        parse_numeric(&self.raw.bytes[124..136])
    }

    /// Get the raw path bytes (name field only, null-truncated).
    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        truncate_null(&self.raw.bytes[0..100])
    }

    /// Get the raw link target bytes (null-truncated).
    #[must_use]
    pub fn link_name_bytes(&self) -> &[u8] {
        truncate_null(&self.raw.bytes[157..257])
    }

    /// Get the UStar prefix field for long paths.
    ///
    /// Returns `None` unless the UStar magic is present: GNU tar reuses
    /// these bytes for atime/ctime/sparse fields.
    #[must_use]
    pub fn prefix_bytes(&self) -> Option<&[u8]> {
        if !self.is_ustar() {
            return None;
        }
        Some(truncate_null(&self.raw.bytes[345..500]))
    }

    /// Verify the header checksum.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::ChecksumMismatch`] if the checksum is wrong,
    /// or [`HeaderError::InvalidOctal`] if the stored value cannot be parsed.
    pub fn verify_checksum(&self) -> Result<()> {
        let stored = parse_octal(&self.raw.bytes[148..156])?;
        let computed = self.compute_checksum();
        if stored == computed {
            Ok(())
        } else {
            Err(HeaderError::ChecksumMismatch { stored, computed })
        }
    }

    /// Compute the header checksum: the unsigned sum of all header bytes
    /// with the checksum field itself (bytes 148..156) treated as spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let mut sum: u64 = 0;
        for (i, &byte) in self.raw.bytes.iter().enumerate() {
            if (148..156).contains(&i) {
                sum += u64::from(b' ');
            } else {
                sum += u64::from(byte);
            }
        }
        sum
    }

    /// Check if this block is all zeros.
    ///
    /// Two consecutive zero blocks mark the end of the archive.
    #[must_use]
    pub fn is_zero_block(&self) -> bool {
        self.raw.bytes.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("name", &String::from_utf8_lossy(self.name_bytes()))
            .field("type_flag", &self.type_flag())
            .field("size", &self.entry_size().ok())
            .field("is_ustar", &self.is_ustar())
            .finish()
    }
}

/// Parse an octal ASCII field into a u64.
///
/// Octal fields are ASCII strings with optional leading spaces and trailing
/// spaces or null bytes, e.g. `"0000644\0"` -> 420.
///
/// # Errors
///
/// Returns [`HeaderError::InvalidOctal`] on characters other than spaces,
/// digits 0-7, or null bytes.
pub fn parse_octal(bytes: &[u8]) -> Result<u64> {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let end = bytes[start..]
        .iter()
        .position(|&b| b == b' ' || b == b'\0')
        .map_or(bytes.len(), |i| start + i);

    let trimmed = &bytes[start..end];

    if trimmed.is_empty() {
        return Ok(0);
    }

    let mut value: u64 = 0;
    for &byte in trimmed {
        if !byte.is_ascii_digit() || byte > b'7' {
            return Err(HeaderError::InvalidOctal(bytes.to_vec()));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| HeaderError::InvalidOctal(bytes.to_vec()))?;
    }

    Ok(value)
}

/// Parse a numeric field that may be octal ASCII or GNU base-256 encoded.
///
/// When the high bit of the first byte is set, the value is big-endian
/// binary in the remaining bits; Windows layer archives use this for entries
/// too large for the 11-digit octal field.
///
/// # Errors
///
/// Returns [`HeaderError::InvalidOctal`] if parsing fails or overflows.
pub fn parse_numeric(bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() {
        return Ok(0);
    }

    if bytes[0] & 0x80 != 0 {
        let mut value: u64 = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            let b = if i == 0 { byte & 0x7f } else { byte };
            value = value
                .checked_shl(8)
                .and_then(|v| v.checked_add(u64::from(b)))
                .ok_or_else(|| HeaderError::InvalidOctal(bytes.to_vec()))?;
        }
        Ok(value)
    } else {
        parse_octal(bytes)
    }
}

/// Truncate a byte slice at the first null byte.
///
/// Used to extract null-terminated strings from fixed-size fields. If no
/// null byte is found, the entire slice is returned.
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}
