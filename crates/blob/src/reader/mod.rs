//! Reconstructing externally stored fields from their chains.
//!
//! Each page is read in its own short mini-transaction, so a reader never
//! holds more than one BLOB page latch.

use std::iter;

use log::trace;
use offpage_primitives::PageSize;
use typed_arena::Arena;

use crate::{
    engine::{BufferPool, RedoLog},
    rec::RecOffsets,
    reference::{BlobRef, MAX_BLOB_LEN},
};

mod compressed;
mod uncompressed;

pub use compressed::CompressedReader;
pub use uncompressed::UncompressedReader;

/// Copies the chain `r` points at into `buf`, up to `buf.len()` bytes.
///
/// Returns the number of bytes copied. This is less than `buf.len()` only
/// when the chain ends early, which is corruption unless the BLOB is still
/// being written.
pub fn copy_blob<E: BufferPool + RedoLog>(
    env: &mut E,
    page_size: PageSize,
    r: &BlobRef,
    is_sdi: bool,
    buf: &mut [u8],
) -> usize {
    if buf.is_empty() || r.is_null_page() {
        return 0;
    }
    if page_size.is_compressed() {
        CompressedReader::new(env, page_size, is_sdi).read(r, buf)
    } else {
        UncompressedReader::new(env, is_sdi).read(r, buf)
    }
}

/// Reconstructs the full value of externally stored field `field_no` of
/// `rec`: its local prefix followed by the off-page bytes.
///
/// The value is allocated in `heap`. Returns `None` if the reference is
/// zero, i.e. the field was never written. That only happens when rolling
/// back an aborted insert, or when reading uncommitted data.
pub fn copy_externally_stored_field<'h, E: BufferPool + RedoLog>(
    env: &mut E,
    rec: &[u8],
    offsets: &RecOffsets,
    page_size: PageSize,
    field_no: usize,
    is_sdi: bool,
    heap: &'h Arena<u8>,
) -> Option<&'h [u8]> {
    debug_assert!(offsets.is_nth_extern(field_no));
    let field = &rec[offsets.nth_field(field_no)];
    let local_len = offsets.local_len(field_no);
    let r = BlobRef::from_bytes(&field[local_len..]);
    if r.is_zero() {
        trace!("field {field_no} has a zero reference");
        return None;
    }

    let mut extern_len = r.length();
    if extern_len > MAX_BLOB_LEN {
        corruption!(
            "field {field_no} claims {extern_len} bytes in the BLOB at {}",
            r.page_id()
        );
        extern_len = MAX_BLOB_LEN;
    }
    let extern_len = extern_len as usize;
    let buf = heap.alloc_extend(iter::repeat_n(0, local_len + extern_len));
    buf[..local_len].copy_from_slice(&field[..local_len]);
    let copied = copy_blob(env, page_size, &r, is_sdi, &mut buf[local_len..]);

    let buf: &'h [u8] = buf;
    Some(&buf[..local_len + copied])
}

/// Copies at most `buf.len()` leading bytes of externally stored field
/// `field_no` of `rec` into `buf`.
///
/// Returns the number of bytes copied, or `None` if the reference is zero,
/// which signals a BLOB that was never written or is half-deleted.
pub fn copy_externally_stored_field_prefix<E: BufferPool + RedoLog>(
    env: &mut E,
    rec: &[u8],
    offsets: &RecOffsets,
    page_size: PageSize,
    field_no: usize,
    is_sdi: bool,
    buf: &mut [u8],
) -> Option<usize> {
    debug_assert!(offsets.is_nth_extern(field_no));
    let field = &rec[offsets.nth_field(field_no)];
    let local_len = offsets.local_len(field_no);
    let r = BlobRef::from_bytes(&field[local_len..]);
    if r.is_zero() {
        return None;
    }

    let local = local_len.min(buf.len());
    buf[..local].copy_from_slice(&field[..local]);
    if local == buf.len() {
        return Some(local);
    }

    let want = (buf.len() - local).min(r.length() as usize);
    Some(local + copy_blob(env, page_size, &r, is_sdi, &mut buf[local..local + want]))
}
