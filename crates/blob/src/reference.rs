//! Provides [`BlobRef`], the fixed-size reference to an off-page column value
//! stored at the tail of the column's local prefix.
//!
//! On-disk layout (20 bytes, big-endian):
//!
//! ```text
//! [0..4]    space id
//! [4..8]    page number of the first page of the chain
//! [8..12]   offset of the chain header within the first page
//! [12..20]  length word: flags in the most significant byte, byte length below
//! ```
//!
//! The flag bits are kept bit-compatible with the rest of the row format:
//! `0x80` is set when this row version does *not* own the chain,
//! `0x40` is set when the chain was inherited from an older row version.
//! Within this crate, the flags are only ever seen through [`BlobRef`]'s
//! accessors.

use bitflags::bitflags;
use offpage_primitives::{fil, PageId, PageNo, SpaceId};

/// The size of a [`BlobRef`] in a record.
pub const FIELD_REF_SIZE: usize = 20;

const REF_SPACE_ID: usize = 0;
const REF_PAGE_NO: usize = 4;
const REF_OFFSET: usize = 8;
const REF_LEN: usize = 12;

bitflags! {
    /// Flags in the most significant byte of the length word.
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    struct LenFlags: u8 {
        /// This row version does not own the chain.
        const NOT_OWNER = 0x80;
        /// The chain was created by an older version of the row.
        const INHERITED = 0x40;
    }
}

/// The largest byte length a reference can describe.
pub const MAX_BLOB_LEN: u64 = u32::MAX as u64;

/// A decoded external field reference.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlobRef {
    pub space_id: SpaceId,
    pub page_no: PageNo,
    /// Offset of the chain header within the first page.
    pub offset: u32,
    owner: bool,
    inherited: bool,
    length: u64,
}

impl BlobRef {
    /// The all-zero reference of a field that has not been written yet.
    pub const ZERO: Self = Self {
        space_id: SpaceId(0),
        page_no: PageNo(0),
        offset: 0,
        owner: true,
        inherited: false,
        length: 0,
    };

    /// Decodes the reference stored in the first [`FIELD_REF_SIZE`] bytes of `buf`.
    ///
    /// Panics if `buf` is shorter than that.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let word = fil::read_u64(buf, REF_LEN);
        let flags = LenFlags::from_bits_truncate((word >> 56) as u8);
        Self {
            space_id: SpaceId(fil::read_u32(buf, REF_SPACE_ID)),
            page_no: PageNo(fil::read_u32(buf, REF_PAGE_NO)),
            offset: fil::read_u32(buf, REF_OFFSET),
            owner: !flags.contains(LenFlags::NOT_OWNER),
            inherited: flags.contains(LenFlags::INHERITED),
            length: word & 0x00ff_ffff_ffff_ffff,
        }
    }

    /// Encodes `self` in its on-disk form.
    pub fn to_bytes(&self) -> [u8; FIELD_REF_SIZE] {
        let mut flags = LenFlags::empty();
        flags.set(LenFlags::NOT_OWNER, !self.owner);
        flags.set(LenFlags::INHERITED, self.inherited);
        let word = (u64::from(flags.bits()) << 56) | self.length;

        let mut out = [0; FIELD_REF_SIZE];
        out[REF_SPACE_ID..REF_PAGE_NO].copy_from_slice(&self.space_id.0.to_be_bytes());
        out[REF_PAGE_NO..REF_OFFSET].copy_from_slice(&self.page_no.0.to_be_bytes());
        out[REF_OFFSET..REF_LEN].copy_from_slice(&self.offset.to_be_bytes());
        out[REF_LEN..].copy_from_slice(&word.to_be_bytes());
        out
    }

    /// Is this the all-zero reference of a field not yet written?
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Does the reference point at no page at all?
    #[inline]
    pub fn is_null_page(&self) -> bool {
        self.page_no.is_null()
    }

    /// The first page of the chain.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(self.space_id, self.page_no)
    }

    /// Is this row version responsible for freeing the chain?
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    #[inline]
    pub fn set_owner(&mut self, owner: bool) {
        self.owner = owner;
    }

    /// Was the chain created by an older version of the row?
    #[inline]
    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    #[inline]
    pub fn set_inherited(&mut self, inherited: bool) {
        self.inherited = inherited;
    }

    /// The length of the stored value in bytes.
    ///
    /// For compressed chains, this is the uncompressed length.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Panics if `length > MAX_BLOB_LEN`.
    #[inline]
    pub fn set_length(&mut self, length: u64) {
        assert!(length <= MAX_BLOB_LEN, "BLOB length {length} exceeds {MAX_BLOB_LEN}");
        self.length = length;
    }

    /// A reference that is fully written and owned:
    /// neither zero, nor pointing at no page, nor disowned.
    pub fn is_committed(&self) -> bool {
        !self.is_zero() && !self.is_null_page() && self.owner
    }
}
