//! The storage engine services consumed by this crate.
//!
//! Page allocation, the buffer pool, the redo log, the clustered index and
//! online DDL logging are all external to off-page column storage. They are
//! expressed as traits here, and brought together as [`Engine`].
//! An in-memory implementation of all of them is provided by
//! [`crate::mem::Memory`] (with the `test` feature).

use offpage_primitives::{IndexId, PageId, PageNo, PageSize, SpaceId};

use crate::{
    error::OutOfFileSpace,
    mtr::{MemoSlot, Mtr},
    rec::RecPos,
};

/// What this crate needs to know about the clustered index.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndexInfo {
    pub id: IndexId,
    /// The tablespace of the index, and of its BLOB chains.
    pub space: SpaceId,
    pub page_size: PageSize,
    /// Is this the serialized dictionary information index?
    /// Its BLOB pages carry distinct page types.
    pub is_sdi: bool,
    /// Is an online DDL operation logging changes to this index?
    pub online_ddl: bool,
    /// Intrinsic (temporary, single-session) tables are not latched.
    pub intrinsic: bool,
}

impl IndexInfo {
    /// Does `mtr` hold the index tree X-lock, or is no lock needed?
    pub fn is_x_latched(&self, mtr: &Mtr) -> bool {
        self.intrinsic || mtr.memo_contains(MemoSlot::IndexX(self.id))
    }
}

/// A persistent cursor positioned on a clustered index record.
#[derive(Debug, Clone)]
pub struct Pcur {
    pub index: IndexInfo,
    pub rec: RecPos,
}

/// Free extents reserved for an allocation.
#[derive(Debug)]
#[must_use = "reservations must be released"]
pub struct Reservation {
    pub space: SpaceId,
    pub n_pages: usize,
}

/// Tablespace extent and page management.
pub trait FileSpace {
    /// Reserve enough free extents in `space` to allocate `n_pages`.
    fn reserve_free_extents(
        &mut self,
        space: SpaceId,
        n_pages: usize,
        mtr: &mut Mtr,
    ) -> Result<Reservation, OutOfFileSpace>;

    /// Release a reservation obtained from [`Self::reserve_free_extents`].
    fn release_free_extents(&mut self, reservation: Reservation);

    /// Allocate a page in `space`, preferably `hint`.
    ///
    /// The new page's frame is zeroed except for its file page header,
    /// and is X-latched in `mtr`.
    fn alloc_page(&mut self, space: SpaceId, hint: PageNo, mtr: &mut Mtr) -> Result<PageNo, OutOfFileSpace>;

    /// Return `page` to the free space of its tablespace.
    fn free_page(&mut self, page: PageId, mtr: &mut Mtr);
}

/// Access to page frames.
///
/// Requesting a page that does not exist is a fatal corruption.
pub trait BufferPool {
    /// Fetch the frame of `page`, X-latched in `mtr`.
    fn page_x(&mut self, page: PageId, mtr: &mut Mtr) -> &mut [u8];

    /// Fetch the frame of `page`, S-latched in `mtr`.
    fn page_s(&mut self, page: PageId, mtr: &mut Mtr) -> &[u8];

    /// Fetch the compressed image of `page`, if its tablespace is compressed.
    fn page_zip(&mut self, page: PageId) -> Option<&[u8]>;

    /// Copy the physical-size prefix of the frame of `page` into its
    /// compressed image. The page must be X-latched in `mtr`.
    fn sync_zip(&mut self, page: PageId, mtr: &Mtr);

    /// Pin `page` in the buffer pool without latching it.
    fn buffer_fix(&mut self, page: PageId);

    /// Release a pin taken with [`Self::buffer_fix`].
    fn buffer_unfix(&mut self, page: PageId);
}

/// The redo log.
pub trait RedoLog {
    /// Commit `mtr`: append its redo and release its latches.
    fn mtr_commit(&mut self, mtr: &mut Mtr);

    /// Ensure there is room in the redo log for further mini-transactions.
    ///
    /// May block until a checkpoint frees space, so it must not be called
    /// while holding any latch.
    fn check_free_space(&mut self);
}

/// Access to clustered index records.
pub trait ClusteredIndex {
    /// A saved cursor position that survives latch release.
    type Saved;

    /// The bytes of the record at `pos`.
    fn rec(&self, pos: RecPos) -> &[u8];

    /// The bytes of the record at `pos`, for modification.
    /// The record page must be X-latched by the caller.
    fn rec_mut(&mut self, pos: RecPos) -> &mut [u8];

    /// X-latch the page of the record at `pos` in `mtr`.
    fn latch_rec_page(&mut self, pos: RecPos, mtr: &mut Mtr);

    /// Save the position of the record at `pos`.
    fn store_position(&self, pos: RecPos) -> Self::Saved;

    /// Re-acquire the index X-lock and the record page X-latch in `mtr`
    /// and return the (possibly moved) position of the saved record.
    fn restore_position(&mut self, index: &IndexInfo, saved: Self::Saved, mtr: &mut Mtr) -> RecPos;
}

/// Notifications to an online DDL operation in progress on the index.
pub trait OnlineLog {
    /// A BLOB chain starting at `page_no` is being written.
    fn blob_alloc(&mut self, _index: &IndexInfo, _page_no: PageNo) {}

    /// The BLOB chain starting at `page_no` is about to be freed.
    fn blob_free(&mut self, _index: &IndexInfo, _page_no: PageNo) {}
}

/// All the services needed to store, read and delete off-page columns.
pub trait Engine: FileSpace + BufferPool + RedoLog + ClusteredIndex + OnlineLog {}

impl<T: FileSpace + BufferPool + RedoLog + ClusteredIndex + OnlineLog> Engine for T {}
