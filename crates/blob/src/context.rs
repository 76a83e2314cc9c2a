use log::trace;
use offpage_primitives::{PageId, PageNo, PageSize, SpaceId};

use crate::{
    engine::{Engine, IndexInfo, Pcur},
    mtr::Mtr,
    rec::{BigRec, RecOffsets, RecPos},
    reference::BlobRef,
    Options,
};

/// The kind of row operation storing external fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlobOp {
    /// A fresh insert.
    Insert,
    /// An insert that replaced a delete-marked record with the same key.
    InsertUpdate,
    /// An update of an existing record.
    Update,
    /// An insert from a bulk index build.
    InsertBulk,
}

impl BlobOp {
    pub fn is_update(self) -> bool {
        matches!(self, Self::InsertUpdate | Self::Update)
    }

    pub fn is_bulk(self) -> bool {
        self == Self::InsertBulk
    }
}

/// How to get back to the record after committing the covering
/// mini-transaction.
enum Resume<S> {
    /// The record page stayed buffer-fixed, so the record did not move.
    Pinned(PageId),
    /// The cursor position was saved and must be restored.
    Repositioned(S),
}

/// Everything a BLOB write needs to reach back to the owning record.
///
/// The covering mini-transaction `mtr` holds the index X-lock and the record
/// page X-latch for the whole write, except transiently inside
/// [`Self::check_redolog`].
pub struct BlobWriteContext<'a, E: Engine> {
    env: &'a mut E,
    pcur: &'a mut Pcur,
    offsets: &'a mut RecOffsets,
    big_rec: &'a BigRec,
    mtr: &'a mut Mtr,
    op: BlobOp,
    opts: &'a Options,
    redolog_checks: usize,
}

impl<'a, E: Engine> BlobWriteContext<'a, E> {
    pub(crate) fn new(
        env: &'a mut E,
        pcur: &'a mut Pcur,
        offsets: &'a mut RecOffsets,
        big_rec: &'a BigRec,
        mtr: &'a mut Mtr,
        op: BlobOp,
        opts: &'a Options,
    ) -> Self {
        let ctx = Self {
            env,
            pcur,
            offsets,
            big_rec,
            mtr,
            op,
            opts,
            redolog_checks: 0,
        };
        ctx.debug_check_latches();
        ctx
    }

    pub fn env(&mut self) -> &mut E {
        &mut *self.env
    }

    pub fn index(&self) -> &IndexInfo {
        &self.pcur.index
    }

    pub fn space(&self) -> SpaceId {
        self.pcur.index.space
    }

    pub fn page_size(&self) -> PageSize {
        self.pcur.index.page_size
    }

    pub fn is_sdi(&self) -> bool {
        self.pcur.index.is_sdi
    }

    /// The current position of the record. It may change across
    /// [`Self::check_redolog`].
    pub fn rec_pos(&self) -> RecPos {
        self.pcur.rec
    }

    pub fn op(&self) -> BlobOp {
        self.op
    }

    pub fn opts(&self) -> &'a Options {
        self.opts
    }

    pub fn big_rec(&self) -> &'a BigRec {
        self.big_rec
    }

    pub fn offsets(&self) -> &RecOffsets {
        &*self.offsets
    }

    pub fn rec(&self) -> &[u8] {
        self.env.rec(self.pcur.rec)
    }

    /// The number of times [`Self::check_redolog`] ran.
    pub fn redolog_checks(&self) -> usize {
        self.redolog_checks
    }

    pub fn field_ref(&self, field_no: usize) -> BlobRef {
        self.offsets.field_ref(self.rec(), field_no)
    }

    /// Overwrites the reference of `field_no`, logged in the covering
    /// mini-transaction.
    pub fn set_field_ref(&mut self, field_no: usize, r: &BlobRef) {
        let range = self.offsets.ref_range_or_panic(field_no);
        let rec = self.env.rec_mut(self.pcur.rec);
        self.mtr.write_bytes(rec, range.start, &r.to_bytes());
    }

    pub fn make_nth_extern(&mut self, field_no: usize) {
        self.offsets.make_nth_extern(field_no);
    }

    /// Tells an online DDL operation on the index that a chain starting at
    /// `first` is being written.
    pub(crate) fn notify_blob_alloc(&mut self, first: PageNo) {
        if self.pcur.index.online_ddl {
            self.env.blob_alloc(&self.pcur.index, first);
        }
    }

    /// Starts a mini-transaction for writing one BLOB page.
    ///
    /// It inherits the log mode and flush observer of the covering
    /// mini-transaction.
    pub(crate) fn start_blob_mtr(&self) -> Mtr {
        let mut mtr = Mtr::new();
        mtr.set_log_mode(self.mtr.log_mode());
        mtr.set_flush_observer(self.mtr.flush_observer());
        mtr.start();
        mtr
    }

    pub(crate) fn commit_blob_mtr(&mut self, mtr: &mut Mtr) {
        debug_assert_eq!(mtr.flush_observer(), self.mtr.flush_observer());
        self.env.mtr_commit(mtr);
    }

    /// Makes room in the redo log.
    ///
    /// Commits the covering mini-transaction, checks for free log space
    /// without holding any latch, restarts the mini-transaction and
    /// re-latches the record. Outside of bulk loads, the record may move in
    /// the meantime, in which case the cursor follows it.
    pub fn check_redolog(&mut self) {
        let token = self.suspend();
        self.env.mtr_commit(self.mtr);
        self.env.check_free_space();
        self.mtr.start();
        self.resume(token);
        self.redolog_checks += 1;
        self.debug_check_latches();
    }

    fn suspend(&mut self) -> Resume<E::Saved> {
        if self.op.is_bulk() {
            let page = self.pcur.rec.page;
            self.env.buffer_fix(page);
            Resume::Pinned(page)
        } else {
            Resume::Repositioned(self.env.store_position(self.pcur.rec))
        }
    }

    fn resume(&mut self, token: Resume<E::Saved>) {
        match token {
            Resume::Pinned(page) => {
                self.env.latch_rec_page(self.pcur.rec, self.mtr);
                self.env.buffer_unfix(page);
            }
            Resume::Repositioned(saved) => {
                let pos = self.env.restore_position(&self.pcur.index, saved, self.mtr);
                if pos != self.pcur.rec {
                    trace!("record moved from {:?} to {:?}", self.pcur.rec, pos);
                    self.pcur.rec = pos;
                }
                debug_assert!(self.env.rec(pos).len() >= self.offsets.data_size());
            }
        }
    }

    fn debug_check_latches(&self) {
        debug_assert!(self.mtr.is_active());
        debug_assert!(
            self.op.is_bulk() || self.pcur.index.is_x_latched(self.mtr),
            "index {} is not X-locked",
            self.pcur.index.id
        );
        debug_assert!(
            self.pcur.index.intrinsic || self.mtr.is_page_x_latched(self.pcur.rec.page),
            "record page {} is not X-latched",
            self.pcur.rec.page
        );
    }
}
