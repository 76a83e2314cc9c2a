//! Layout of BLOB pages.
//!
//! An uncompressed BLOB page stores a chunk header at [`FIL_PAGE_DATA`]:
//!
//! ```text
//! [0..4]  part_len      bytes of payload on this page
//! [4..8]  next_page_no  next page of the chain, or FIL_NULL
//! [8..]   payload
//! ```
//!
//! A compressed BLOB page stores a window of the deflate stream from
//! [`FIL_PAGE_DATA`] up to the physical page size. Its next page is kept in
//! the file page header at [`FIL_PAGE_NEXT`].

use offpage_primitives::{
    fil::{self, FIL_PAGE_DATA, FIL_PAGE_DATA_END, FIL_PAGE_NEXT},
    PageId, PageNo, PageSize, PageType,
};

/// Offset of `part_len` within the chunk header.
pub const BLOB_HDR_PART_LEN: usize = 0;
/// Offset of `next_page_no` within the chunk header.
pub const BLOB_HDR_NEXT_PAGE_NO: usize = 4;
/// Size of the chunk header.
pub const BLOB_HDR_SIZE: usize = 8;

/// The number of payload bytes one uncompressed BLOB page holds.
pub const fn blob_payload_capacity(page_size: PageSize) -> usize {
    page_size.physical() - FIL_PAGE_DATA - BLOB_HDR_SIZE - FIL_PAGE_DATA_END
}

/// The number of deflate output bytes one compressed BLOB page holds.
pub const fn zblob_payload_capacity(page_size: PageSize) -> usize {
    page_size.physical() - FIL_PAGE_DATA
}

/// The page type of an uncompressed BLOB page.
pub(crate) fn blob_page_type(is_sdi: bool) -> PageType {
    if is_sdi {
        PageType::SdiBlob
    } else {
        PageType::Blob
    }
}

/// The page type of a compressed BLOB page.
pub(crate) fn zblob_page_type(first: bool, is_sdi: bool) -> PageType {
    match (first, is_sdi) {
        (_, true) => PageType::SdiZBlob,
        (true, false) => PageType::ZBlob,
        (false, false) => PageType::ZBlob2,
    }
}

/// Reads the next-page pointer of an uncompressed BLOB page whose chunk
/// header is at `offset`.
pub(crate) fn blob_next_page(frame: &[u8], offset: usize) -> PageNo {
    PageNo(fil::read_u32(frame, offset + BLOB_HDR_NEXT_PAGE_NO))
}

/// Reads `part_len` of an uncompressed BLOB page whose chunk header is at `offset`.
pub(crate) fn blob_part_len(frame: &[u8], offset: usize) -> usize {
    fil::read_u32(frame, offset + BLOB_HDR_PART_LEN) as usize
}

/// Reads the next-page pointer of a compressed BLOB page.
pub(crate) fn zblob_next_page(frame: &[u8]) -> PageNo {
    PageNo(fil::read_u32(frame, FIL_PAGE_NEXT))
}

/// Checks that the page `id` has type `expected`.
///
/// A mismatch is reported as corruption.
pub(crate) fn check_page_type(frame: &[u8], id: PageId, expected: impl Fn(PageType) -> bool) -> bool {
    match PageType::read(frame) {
        Ok(ty) if expected(ty) => true,
        Ok(ty) => {
            corruption!("unexpected type {ty:?} of BLOB page {id}");
            false
        }
        Err(e) => {
            corruption!("{e} of BLOB page {id}");
            false
        }
    }
}
