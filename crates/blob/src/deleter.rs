use log::{debug, trace};
use offpage_primitives::{fil::FIL_PAGE_DATA, PageType};

use crate::{
    engine::{Engine, IndexInfo},
    mtr::{LogMode, Mtr},
    page::{blob_next_page, check_page_type, zblob_next_page},
    rec::{RecOffsets, RecPos},
    reference::BlobRef,
};

/// Why a record's BLOBs are being freed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RollbackCtx {
    /// Purge of a delete-marked record, or an update freeing old chains.
    None,
    /// Rollback of an active transaction.
    Normal,
    /// Rollback during crash recovery, of a record being purged.
    RecoveryPurgeRec,
    /// Rollback during crash recovery.
    Recovery,
}

impl RollbackCtx {
    pub fn is_rollback(self) -> bool {
        self != Self::None
    }
}

/// Frees the chain of one externally stored field.
///
/// Pages are freed from the head, one mini-transaction each. After every
/// page, the reference is advanced to the next page with its length cleared,
/// so a crash leaves a shorter but well-formed chain that is never read
/// again.
pub struct BlobDeleter<'a, E> {
    env: &'a mut E,
    index: &'a IndexInfo,
    rec: RecPos,
    offsets: &'a RecOffsets,
    field_no: usize,
    rb_ctx: RollbackCtx,
    log_mode: LogMode,
}

impl<'a, E: Engine> BlobDeleter<'a, E> {
    /// `caller_mtr` must hold the index X-lock and the record page X-latch.
    pub fn new(
        env: &'a mut E,
        index: &'a IndexInfo,
        rec: RecPos,
        offsets: &'a RecOffsets,
        field_no: usize,
        rb_ctx: RollbackCtx,
        caller_mtr: &Mtr,
    ) -> Self {
        debug_assert!(offsets.is_nth_extern(field_no));
        debug_assert!(index.is_x_latched(caller_mtr));
        debug_assert!(index.intrinsic || caller_mtr.is_page_x_latched(rec.page));
        Self {
            env,
            index,
            rec,
            offsets,
            field_no,
            rb_ctx,
            log_mode: caller_mtr.log_mode(),
        }
    }

    fn field_ref(&self) -> BlobRef {
        self.offsets.field_ref(self.env.rec(self.rec), self.field_no)
    }

    /// May this row version free the chain `r` points at?
    fn can_free(&self, r: &BlobRef) -> bool {
        if !r.is_owner() || r.is_null_page() {
            return false;
        }
        // An inherited chain is still referenced by the row version the
        // rollback returns to.
        !(self.rb_ctx.is_rollback() && r.is_inherited())
    }

    /// Frees the chain, if this row version owns it.
    ///
    /// Returns the number of pages freed.
    pub fn destroy(mut self) -> usize {
        let r = self.field_ref();
        if r.is_zero() {
            // Only an insert that crashed before writing the BLOB leaves this.
            debug_assert!(self.rb_ctx.is_rollback(), "zero reference of field {}", self.field_no);
            trace!("field {} was never written", self.field_no);
            return 0;
        }
        if !self.can_free(&r) {
            trace!("field {} does not own {r:?}", self.field_no);
            return 0;
        }

        if self.index.online_ddl {
            self.env.blob_free(self.index, r.page_no);
        }
        let first = r.page_id();
        let n_pages = self.free_chain();
        debug!(
            "freed {n_pages} page(s) of field {} starting at {first} ({:?})",
            self.field_no, self.rb_ctx
        );
        n_pages
    }

    fn free_chain(&mut self) -> usize {
        let compressed = self.index.page_size.is_compressed();
        let range = self.offsets.ref_range_or_panic(self.field_no);
        let mut n_pages = 0;

        loop {
            let mut mtr = Mtr::new();
            mtr.set_log_mode(self.log_mode);
            mtr.start();
            self.env.latch_rec_page(self.rec, &mut mtr);

            let mut r = self.field_ref();
            if !self.can_free(&r) {
                self.env.mtr_commit(&mut mtr);
                break;
            }
            let id = r.page_id();
            debug_assert_eq!(id.space, self.index.space);

            let frame = self.env.page_x(id, &mut mtr);
            let next = if compressed {
                check_page_type(frame, id, PageType::is_zblob).then(|| zblob_next_page(frame))
            } else {
                check_page_type(frame, id, |ty| matches!(ty, PageType::Blob | PageType::SdiBlob))
                    .then(|| blob_next_page(frame, FIL_PAGE_DATA))
            };
            let Some(next) = next else {
                self.env.mtr_commit(&mut mtr);
                break;
            };

            self.env.free_page(id, &mut mtr);
            r.page_no = next;
            r.set_length(0);
            let rec = self.env.rec_mut(self.rec);
            mtr.write_bytes(rec, range.start, &r.to_bytes());
            self.env.mtr_commit(&mut mtr);
            n_pages += 1;
        }

        n_pages
    }
}
