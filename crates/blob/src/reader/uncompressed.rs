use offpage_primitives::{fil::FIL_PAGE_DATA, PageId};

use crate::{
    engine::{BufferPool, RedoLog},
    mtr::Mtr,
    page::{blob_next_page, blob_page_type, blob_part_len, check_page_type, BLOB_HDR_SIZE},
    reference::BlobRef,
};

/// Reads an uncompressed chain by following the chunk headers.
pub struct UncompressedReader<'e, E> {
    env: &'e mut E,
    is_sdi: bool,
}

impl<'e, E: BufferPool + RedoLog> UncompressedReader<'e, E> {
    pub fn new(env: &'e mut E, is_sdi: bool) -> Self {
        Self { env, is_sdi }
    }

    /// Copies the chain starting at `r` into `buf` until either is exhausted.
    pub fn read(&mut self, r: &BlobRef, buf: &mut [u8]) -> usize {
        let expected = blob_page_type(self.is_sdi);
        let mut copied = 0;
        let mut page_no = r.page_no;
        let mut offset = r.offset as usize;

        loop {
            let id = PageId::new(r.space_id, page_no);
            let mut mtr = Mtr::new();
            mtr.start();
            let frame = self.env.page_s(id, &mut mtr);

            if !check_page_type(frame, id, |ty| ty == expected) {
                self.env.mtr_commit(&mut mtr);
                break;
            }
            let part_len = blob_part_len(frame, offset);
            let n = part_len.min(buf.len() - copied);
            let start = offset + BLOB_HDR_SIZE;
            let Some(part) = frame.get(start..start + n) else {
                corruption!("BLOB page {id} claims {part_len} bytes at offset {offset}");
                self.env.mtr_commit(&mut mtr);
                break;
            };
            buf[copied..copied + n].copy_from_slice(part);
            copied += n;
            let next = blob_next_page(frame, offset);
            self.env.mtr_commit(&mut mtr);

            if copied == buf.len() || next.is_null() {
                break;
            }
            page_no = next;
            offset = FIL_PAGE_DATA;
        }

        copied
    }
}
