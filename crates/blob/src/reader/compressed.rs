use flate2::{Decompress, FlushDecompress, Status};
use log::error;
use offpage_primitives::{
    fil::{FIL_PAGE_DATA, FIL_PAGE_NEXT},
    PageId, PageSize,
};

use crate::{
    engine::{BufferPool, RedoLog},
    page::{check_page_type, zblob_next_page, zblob_page_type},
    reference::BlobRef,
};

/// Reads a compressed chain by inflating the compressed page images in
/// order, as one zlib stream.
pub struct CompressedReader<'e, E> {
    env: &'e mut E,
    physical: usize,
    is_sdi: bool,
}

impl<'e, E: BufferPool + RedoLog> CompressedReader<'e, E> {
    pub fn new(env: &'e mut E, page_size: PageSize, is_sdi: bool) -> Self {
        debug_assert!(page_size.is_compressed());
        Self {
            env,
            physical: page_size.physical(),
            is_sdi,
        }
    }

    /// Inflates the chain starting at `r` into `buf` until `buf` is full or
    /// the stream ends.
    pub fn read(&mut self, r: &BlobRef, buf: &mut [u8]) -> usize {
        debug_assert_eq!(r.offset as usize, FIL_PAGE_NEXT);
        let mut stream = Decompress::new(true);
        let mut page_no = r.page_no;
        let mut first = true;

        loop {
            let id = PageId::new(r.space_id, page_no);
            let Some(zip) = self.env.page_zip(id) else {
                corruption!("compressed BLOB page {id} has no compressed image");
                break;
            };
            let expected = zblob_page_type(first, self.is_sdi);
            if !check_page_type(zip, id, |ty| ty == expected) {
                break;
            }
            let next = zblob_next_page(zip);

            let out_before = stream.total_out() as usize;
            let status = stream.decompress(
                &zip[FIL_PAGE_DATA..self.physical],
                &mut buf[out_before..],
                FlushDecompress::None,
            );
            let copied = stream.total_out() as usize;

            match status {
                Ok(Status::StreamEnd) => {
                    if copied < buf.len() && !next.is_null() {
                        corruption!("compressed BLOB stream ends on page {id} before the chain does");
                    }
                    break;
                }
                Ok(Status::Ok) if copied == buf.len() => break,
                Ok(Status::Ok) => {}
                // A BLOB being written may be visible to a read-uncommitted
                // reader before it is complete.
                Ok(Status::BufError) => break,
                Err(e) => {
                    corruption!("inflate of compressed BLOB page {id} failed: {e}");
                    break;
                }
            }

            if next.is_null() {
                error!("unexpected end of compressed BLOB at page {id}");
                break;
            }
            page_no = next;
            first = false;
        }

        stream.total_out() as usize
    }
}
