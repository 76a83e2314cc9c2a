use offpage_primitives::{
    fil::{FIL_PAGE_DATA, FIL_PAGE_TYPE},
    PageId, PageSize, FIL_NULL,
};

use super::{Chain, PageWriter};
use crate::{
    context::BlobWriteContext,
    engine::Engine,
    error,
    mtr::Mtr,
    page::{blob_page_type, blob_payload_capacity, BLOB_HDR_NEXT_PAGE_NO, BLOB_HDR_PART_LEN, BLOB_HDR_SIZE},
    rec::BigRecField,
};

/// Copies field bytes verbatim into pages, each with a chunk header.
pub(crate) struct UncompressedWriter {
    capacity: usize,
}

impl UncompressedWriter {
    pub fn new(page_size: PageSize) -> Self {
        debug_assert!(!page_size.is_compressed());
        Self {
            capacity: blob_payload_capacity(page_size),
        }
    }
}

impl PageWriter for UncompressedWriter {
    fn start_field(&mut self, _field: &BigRecField) {}

    fn write_page<E: Engine>(
        &mut self,
        ctx: &mut BlobWriteContext<'_, E>,
        chain: &mut Chain,
        field: &BigRecField,
        mtr: &mut Mtr,
    ) -> Result<bool, error::Store> {
        let page_no = chain.alloc_page(ctx, mtr)?;
        let space = ctx.space();
        let page_type = blob_page_type(ctx.is_sdi());

        let remaining = &field.data[chain.stored..];
        let part_len = remaining.len().min(self.capacity);

        if !chain.prev.is_null() {
            let prev = ctx.env().page_x(PageId::new(space, chain.prev), mtr);
            mtr.write_u32(prev, FIL_PAGE_DATA + BLOB_HDR_NEXT_PAGE_NO, page_no.0);
        }

        let frame = ctx.env().page_x(PageId::new(space, page_no), mtr);
        mtr.write_u16(frame, FIL_PAGE_TYPE, page_type.tag());
        mtr.write_u32(frame, FIL_PAGE_DATA + BLOB_HDR_PART_LEN, part_len as u32);
        mtr.write_u32(frame, FIL_PAGE_DATA + BLOB_HDR_NEXT_PAGE_NO, FIL_NULL);
        mtr.write_bytes(frame, FIL_PAGE_DATA + BLOB_HDR_SIZE, &remaining[..part_len]);

        // The reference always covers exactly what is on disk so far.
        let mut r = ctx.field_ref(field.field_no);
        if chain.is_empty() {
            r.space_id = space;
            r.page_no = page_no;
            r.offset = FIL_PAGE_DATA as u32;
        }
        r.set_length((chain.stored + part_len) as u64);
        ctx.set_field_ref(field.field_no, &r);

        chain.page_written(page_no, part_len);
        Ok(chain.stored == field.data.len())
    }
}
