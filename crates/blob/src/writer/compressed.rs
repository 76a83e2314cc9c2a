use flate2::{Compress, Compression, FlushCompress, Status};
use offpage_primitives::{
    fil::{FIL_PAGE_DATA, FIL_PAGE_FILE_FLUSH_LSN, FIL_PAGE_NEXT, FIL_PAGE_PREV, FIL_PAGE_TYPE},
    PageId, PageSize, FIL_NULL,
};

use super::{Chain, PageWriter};
use crate::{
    context::BlobWriteContext,
    engine::Engine,
    error,
    mtr::Mtr,
    page::{zblob_page_type, zblob_payload_capacity},
    rec::BigRecField,
    validate, Options,
};

/// Deflates each field into one zlib stream, cut into page-sized windows.
///
/// Every page carries, in the otherwise unused flush LSN slot, a back-pointer
/// to the tablespace and page of the owning record.
pub(crate) struct CompressedWriter {
    stream: Compress,
    physical: usize,
    capacity: usize,
    #[cfg(debug_assertions)]
    dir: dir::ZipBlobDir,
}

impl CompressedWriter {
    pub fn new(page_size: PageSize, opts: &Options) -> Self {
        debug_assert!(page_size.is_compressed());
        Self {
            stream: Compress::new(Compression::new(opts.compression_level), true),
            physical: page_size.physical(),
            capacity: zblob_payload_capacity(page_size),
            #[cfg(debug_assertions)]
            dir: dir::ZipBlobDir::default(),
        }
    }
}

impl PageWriter for CompressedWriter {
    fn start_field(&mut self, _field: &BigRecField) {
        self.stream.reset();
        #[cfg(debug_assertions)]
        self.dir.clear();
    }

    fn write_page<E: Engine>(
        &mut self,
        ctx: &mut BlobWriteContext<'_, E>,
        chain: &mut Chain,
        field: &BigRecField,
        mtr: &mut Mtr,
    ) -> Result<bool, error::Store> {
        let page_no = chain.alloc_page(ctx, mtr)?;
        let space = ctx.space();
        let rec_page_no = ctx.rec_pos().page.page_no;
        let page_type = zblob_page_type(chain.is_empty(), ctx.is_sdi());
        let id = PageId::new(space, page_no);

        let frame = ctx.env().page_x(id, mtr);

        let (in_before, out_before) = (self.stream.total_in(), self.stream.total_out());
        let status = self.stream.compress(
            &field.data[chain.stored..],
            &mut frame[FIL_PAGE_DATA..self.physical],
            FlushCompress::Finish,
        );
        let consumed = (self.stream.total_in() - in_before) as usize;
        let produced = (self.stream.total_out() - out_before) as usize;

        let done = match status {
            Ok(Status::StreamEnd) if chain.stored + consumed == field.data.len() => true,
            Ok(Status::Ok) if produced == self.capacity => false,
            res => panic!("deflate of field {} into page {id} failed: {res:?}", field.field_no),
        };

        mtr.write_u16(frame, FIL_PAGE_TYPE, page_type.tag());
        mtr.write_u32(frame, FIL_PAGE_PREV, FIL_NULL);
        mtr.write_u32(frame, FIL_PAGE_NEXT, FIL_NULL);
        mtr.write_u32(frame, FIL_PAGE_FILE_FLUSH_LSN, space.0);
        mtr.write_u32(frame, FIL_PAGE_FILE_FLUSH_LSN + 4, rec_page_no.0);
        mtr.log_string(produced);
        frame[FIL_PAGE_DATA + produced..self.physical].fill(0);
        ctx.env().sync_zip(id, mtr);

        if !chain.prev.is_null() {
            let prev_id = PageId::new(space, chain.prev);
            let prev = ctx.env().page_x(prev_id, mtr);
            mtr.write_u32(prev, FIL_PAGE_NEXT, page_no.0);
            ctx.env().sync_zip(prev_id, mtr);
        }

        // The length is only published once the stream is complete.
        let mut r = ctx.field_ref(field.field_no);
        if chain.is_empty() {
            r.space_id = space;
            r.page_no = page_no;
            r.offset = FIL_PAGE_NEXT as u32;
        }
        r.set_length(if done { field.data.len() as u64 } else { 0 });
        ctx.set_field_ref(field.field_no, &r);

        #[cfg(debug_assertions)]
        {
            self.dir.push(page_no, consumed, produced);
            if done {
                debug_assert_eq!(self.dir.total_in(), field.data.len());
                log::trace!("field {}: {}", field.field_no, self.dir);
            }
        }

        chain.page_written(page_no, consumed);
        Ok(done)
    }

    fn finish<E: Engine>(self, ctx: &mut BlobWriteContext<'_, E>) {
        drop(self.stream);
        debug_assert!(
            validate::extern_refs_valid(ctx.rec(), ctx.offsets()),
            "invalid external reference after compressed store of record {:?}",
            ctx.rec_pos()
        );
    }
}

#[cfg(debug_assertions)]
mod dir {
    use std::fmt;

    use offpage_primitives::PageNo;

    /// Which page holds which part of a compressed field.
    #[derive(Debug, Default)]
    pub(super) struct ZipBlobDir {
        entries: Vec<Entry>,
    }

    #[derive(Debug)]
    struct Entry {
        page_no: PageNo,
        raw_len: usize,
        zip_len: usize,
    }

    impl ZipBlobDir {
        pub fn clear(&mut self) {
            self.entries.clear();
        }

        pub fn push(&mut self, page_no: PageNo, raw_len: usize, zip_len: usize) {
            self.entries.push(Entry {
                page_no,
                raw_len,
                zip_len,
            });
        }

        pub fn total_in(&self) -> usize {
            self.entries.iter().map(|e| e.raw_len).sum()
        }
    }

    impl fmt::Display for ZipBlobDir {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut offset = 0;
            f.write_str("[")?;
            for (i, e) in self.entries.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "page {}: {}+{} -> {}", e.page_no, offset, e.raw_len, e.zip_len)?;
                offset += e.raw_len;
            }
            f.write_str("]")
        }
    }
}
