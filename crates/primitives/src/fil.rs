//! The file page header and trailer shared by all page kinds,
//! plus the page-type tags stored in it.
//!
//! All multi-byte integers in a page are stored big-endian.

use core::fmt;

/// Checksum, or space id in very old formats.
pub const FIL_PAGE_SPACE_OR_CHKSUM: usize = 0;
/// The page number of this page.
pub const FIL_PAGE_OFFSET: usize = 4;
/// The previous page in a doubly-linked list, or `FIL_NULL`.
pub const FIL_PAGE_PREV: usize = 8;
/// The next page in a linked list, or `FIL_NULL`.
pub const FIL_PAGE_NEXT: usize = 12;
/// LSN of the latest modification.
pub const FIL_PAGE_LSN: usize = 16;
/// The page type tag, see [`PageType`].
pub const FIL_PAGE_TYPE: usize = 24;
/// Only meaningful on the first page of a data file.
/// Compressed BLOB pages reuse it to store a back-pointer to the owning record.
pub const FIL_PAGE_FILE_FLUSH_LSN: usize = 26;
/// The tablespace id of this page.
pub const FIL_PAGE_SPACE_ID: usize = 34;
/// Start of the page payload.
pub const FIL_PAGE_DATA: usize = 38;
/// Size of the page trailer (old-style checksum + low LSN bits).
pub const FIL_PAGE_DATA_END: usize = 8;

/// Page type tags.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
#[repr(u16)]
pub enum PageType {
    /// Freshly allocated page.
    Allocated = 0,
    /// Uncompressed BLOB page.
    Blob = 10,
    /// First page of a compressed BLOB chain.
    ZBlob = 11,
    /// Continuation page of a compressed BLOB chain.
    ZBlob2 = 12,
    /// Uncompressed BLOB page of the SDI index.
    SdiBlob = 18,
    /// Compressed BLOB page of the SDI index.
    SdiZBlob = 19,
    /// B-tree node.
    Index = 17855,
}

/// A page type tag that is not one of [`PageType`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UnknownPageType(pub u16);

impl fmt::Display for UnknownPageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown page type {}", self.0)
    }
}

impl TryFrom<u16> for PageType {
    type Error = UnknownPageType;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Allocated,
            10 => Self::Blob,
            11 => Self::ZBlob,
            12 => Self::ZBlob2,
            18 => Self::SdiBlob,
            19 => Self::SdiZBlob,
            17855 => Self::Index,
            v => return Err(UnknownPageType(v)),
        })
    }
}

impl PageType {
    /// Returns the on-disk tag.
    #[inline]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Reads the type tag of `frame`.
    pub fn read(frame: &[u8]) -> Result<Self, UnknownPageType> {
        read_u16(frame, FIL_PAGE_TYPE).try_into()
    }

    /// Is this a BLOB page of a compressed chain?
    pub const fn is_zblob(self) -> bool {
        matches!(self, Self::ZBlob | Self::ZBlob2 | Self::SdiZBlob)
    }
}

/// Reads a big-endian `u16` at `offset`.
#[inline]
pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_be_bytes(b)
}

/// Reads a big-endian `u32` at `offset`.
#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(b)
}

/// Reads a big-endian `u64` at `offset`.
#[inline]
pub fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(b)
}
