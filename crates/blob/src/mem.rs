//! An [`Engine`] backed by hash maps, for tests.
//!
//! Latches are only tracked in the mini-transaction memo, there is no
//! concurrency. The redo log is a byte counter which a free space check
//! resets (a "checkpoint") once it is mostly full.
//!
//! [`Engine`]: crate::engine::Engine

use std::collections::{BTreeSet, HashMap};

use log::{debug, trace};
use offpage_primitives::{
    fil::{self, FIL_PAGE_NEXT, FIL_PAGE_OFFSET, FIL_PAGE_PREV, FIL_PAGE_SPACE_ID, FIL_PAGE_TYPE},
    IndexId, PageId, PageNo, PageSize, PageType, SpaceId, FIL_NULL,
};

use crate::{
    engine::{BufferPool, ClusteredIndex, FileSpace, IndexInfo, OnlineLog, RedoLog, Reservation},
    error::OutOfFileSpace,
    mtr::{MemoSlot, Mtr},
    rec::RecPos,
};

/// Pages below this number hold tablespace metadata.
const FIRST_FREE_PAGE: u32 = 3;

/// The heap number of the first user record on a page.
const HEAP_NO_USER_LOW: u16 = 2;

/// The default redo log capacity in bytes.
pub const DEFAULT_LOG_CAPACITY: usize = 1024 * 1024;

/// Counters of engine activity.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Stats {
    pub mtr_commits: usize,
    pub redo_bytes: usize,
    pub free_space_probes: usize,
    pub checkpoints: usize,
    pub reservations: usize,
    /// Pages allocated through [`FileSpace::alloc_page`].
    pub pages_allocated: usize,
    pub pages_freed: usize,
    pub relocations: usize,
}

/// A notification received through [`OnlineLog`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DdlEvent {
    BlobAlloc(IndexId, PageNo),
    BlobFree(IndexId, PageNo),
}

/// A saved record position: the record's identity, independent of where
/// it lives.
#[derive(Debug)]
pub struct SavedRec {
    key: u64,
}

#[derive(Debug)]
struct Space {
    page_size: PageSize,
    /// One past the highest page number ever allocated.
    size: u32,
    free: BTreeSet<u32>,
}

#[derive(Debug)]
struct Rec {
    key: u64,
    bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Memory {
    spaces: HashMap<SpaceId, Space>,
    frames: HashMap<PageId, Box<[u8]>>,
    zip: HashMap<PageId, Box<[u8]>>,
    recs: HashMap<RecPos, Rec>,
    next_key: u64,
    buf_fix: HashMap<PageId, usize>,
    outstanding_reservations: usize,
    reservation_attempts: usize,
    fail_reservation_at: Option<usize>,
    relocate_on_restore: bool,
    log_capacity: usize,
    log_used: usize,
    log_peak: usize,
    ddl_events: Vec<DdlEvent>,
    stats: Stats,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            spaces: HashMap::new(),
            frames: HashMap::new(),
            zip: HashMap::new(),
            recs: HashMap::new(),
            next_key: 0,
            buf_fix: HashMap::new(),
            outstanding_reservations: 0,
            reservation_attempts: 0,
            fail_reservation_at: None,
            relocate_on_restore: false,
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_used: 0,
            log_peak: 0,
            ddl_events: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn create_space(&mut self, space: SpaceId, page_size: PageSize) {
        let prev = self.spaces.insert(
            space,
            Space {
                page_size,
                size: FIRST_FREE_PAGE,
                free: BTreeSet::new(),
            },
        );
        assert!(prev.is_none(), "space {space} exists");
    }

    /// Make the `n`th extent reservation (counting from 1) and all later
    /// ones fail. `None` disables failures.
    pub fn set_fail_reservation_at(&mut self, n: Option<usize>) {
        self.fail_reservation_at = n;
        self.reservation_attempts = 0;
    }

    /// Move the record to a different page whenever its position is restored.
    pub fn set_relocate_on_restore(&mut self, relocate: bool) {
        self.relocate_on_restore = relocate;
    }

    pub fn set_log_capacity(&mut self, bytes: usize) {
        self.log_capacity = bytes;
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Redo bytes written since the last checkpoint.
    pub fn log_used(&self) -> usize {
        self.log_used
    }

    /// The highest value [`Self::log_used`] ever had.
    pub fn log_peak(&self) -> usize {
        self.log_peak
    }

    pub fn ddl_events(&self) -> &[DdlEvent] {
        &self.ddl_events
    }

    pub fn outstanding_reservations(&self) -> usize {
        self.outstanding_reservations
    }

    pub fn buf_fix_count(&self, page: PageId) -> usize {
        self.buf_fix.get(&page).copied().unwrap_or(0)
    }

    pub fn is_allocated(&self, page: PageId) -> bool {
        self.frames.contains_key(&page)
    }

    /// The number of allocated pages in `space`, including index pages.
    pub fn n_allocated(&self, space: SpaceId) -> usize {
        self.frames.keys().filter(|id| id.space == space).count()
    }

    pub fn frame(&self, page: PageId) -> Option<&[u8]> {
        self.frames.get(&page).map(|f| &**f)
    }

    /// Direct access to a frame, bypassing latching and redo.
    ///
    /// This is intended for tests which deliberately corrupt pages.
    pub fn frame_mut(&mut self, page: PageId) -> Option<&mut [u8]> {
        self.frames.get_mut(&page).map(|f| &mut **f)
    }

    pub fn zip_image(&self, page: PageId) -> Option<&[u8]> {
        self.zip.get(&page).map(|z| &**z)
    }

    /// Direct access to a compressed image, bypassing latching and redo.
    pub fn zip_image_mut(&mut self, page: PageId) -> Option<&mut [u8]> {
        self.zip.get_mut(&page).map(|z| &mut **z)
    }

    /// Inserts a record into a fresh leaf page of `index`.
    pub fn insert_rec(&mut self, index: &IndexInfo, bytes: Vec<u8>) -> RecPos {
        let page = self.alloc_leaf(index.space);
        let key = self.next_key;
        self.next_key += 1;
        let pos = RecPos {
            page,
            heap_no: HEAP_NO_USER_LOW,
        };
        self.recs.insert(pos, Rec { key, bytes });
        pos
    }

    fn alloc_leaf(&mut self, space: SpaceId) -> PageId {
        let page_no = self
            .alloc_in_space(space, PageNo::NULL)
            .unwrap_or_else(|| panic!("space {space} does not exist"));
        let id = PageId::new(space, page_no);
        if let Some(frame) = self.frames.get_mut(&id) {
            frame[FIL_PAGE_TYPE..FIL_PAGE_TYPE + 2].copy_from_slice(&PageType::Index.tag().to_be_bytes());
        }
        id
    }

    fn free_leaf(&mut self, page: PageId) {
        self.frames.remove(&page);
        self.zip.remove(&page);
        if let Some(space) = self.spaces.get_mut(&page.space) {
            space.free.insert(page.page_no.0);
        }
    }

    /// Allocates `hint` if it is free, else the lowest free page, else a new one.
    fn alloc_in_space(&mut self, space_id: SpaceId, hint: PageNo) -> Option<PageNo> {
        let space = self.spaces.get_mut(&space_id)?;
        let page_no = if space.free.remove(&hint.0) {
            hint.0
        } else if hint.0 == space.size {
            space.size += 1;
            hint.0
        } else if let Some(page_no) = space.free.pop_first() {
            page_no
        } else {
            space.size += 1;
            space.size - 1
        };

        let page_size = space.page_size;
        let mut frame = vec![0u8; page_size.logical()].into_boxed_slice();
        frame[FIL_PAGE_OFFSET..FIL_PAGE_OFFSET + 4].copy_from_slice(&page_no.to_be_bytes());
        frame[FIL_PAGE_PREV..FIL_PAGE_PREV + 4].copy_from_slice(&FIL_NULL.to_be_bytes());
        frame[FIL_PAGE_NEXT..FIL_PAGE_NEXT + 4].copy_from_slice(&FIL_NULL.to_be_bytes());
        frame[FIL_PAGE_SPACE_ID..FIL_PAGE_SPACE_ID + 4].copy_from_slice(&space_id.0.to_be_bytes());

        let id = PageId::new(space_id, PageNo(page_no));
        if page_size.is_compressed() {
            self.zip.insert(id, frame[..page_size.physical()].into());
        }
        self.frames.insert(id, frame);

        Some(PageNo(page_no))
    }

    fn find_rec(&self, key: u64) -> Option<RecPos> {
        self.recs.iter().find(|(_, rec)| rec.key == key).map(|(pos, _)| *pos)
    }

    fn rec_entry(&self, pos: RecPos) -> &Rec {
        self.recs
            .get(&pos)
            .unwrap_or_else(|| panic!("no record at {pos:?}"))
    }
}

impl FileSpace for Memory {
    fn reserve_free_extents(
        &mut self,
        space: SpaceId,
        n_pages: usize,
        _mtr: &mut Mtr,
    ) -> Result<Reservation, OutOfFileSpace> {
        self.reservation_attempts += 1;
        let failing = self.fail_reservation_at.is_some_and(|n| self.reservation_attempts >= n);
        if failing || !self.spaces.contains_key(&space) {
            debug!("failing reservation #{} in space {space}", self.reservation_attempts);
            return Err(OutOfFileSpace { space, n_pages });
        }
        self.stats.reservations += 1;
        self.outstanding_reservations += 1;
        Ok(Reservation { space, n_pages })
    }

    fn release_free_extents(&mut self, reservation: Reservation) {
        trace!("releasing {reservation:?}");
        self.outstanding_reservations -= 1;
    }

    fn alloc_page(&mut self, space: SpaceId, hint: PageNo, mtr: &mut Mtr) -> Result<PageNo, OutOfFileSpace> {
        let page_no = self
            .alloc_in_space(space, hint)
            .ok_or(OutOfFileSpace { space, n_pages: 1 })?;
        mtr.memo_push(MemoSlot::PageX(PageId::new(space, page_no)));
        mtr.log_string(fil::FIL_PAGE_DATA);
        self.stats.pages_allocated += 1;
        Ok(page_no)
    }

    fn free_page(&mut self, page: PageId, mtr: &mut Mtr) {
        debug_assert!(mtr.is_page_x_latched(page));
        assert!(self.frames.remove(&page).is_some(), "freeing unallocated page {page}");
        self.zip.remove(&page);
        if let Some(space) = self.spaces.get_mut(&page.space) {
            space.free.insert(page.page_no.0);
        }
        mtr.log_string(0);
        self.stats.pages_freed += 1;
    }
}

impl BufferPool for Memory {
    fn page_x(&mut self, page: PageId, mtr: &mut Mtr) -> &mut [u8] {
        mtr.memo_push(MemoSlot::PageX(page));
        match self.frames.get_mut(&page) {
            Some(frame) => frame,
            None => panic!("page {page} is not allocated"),
        }
    }

    fn page_s(&mut self, page: PageId, mtr: &mut Mtr) -> &[u8] {
        mtr.memo_push(MemoSlot::PageS(page));
        match self.frames.get(&page) {
            Some(frame) => frame,
            None => panic!("page {page} is not allocated"),
        }
    }

    fn page_zip(&mut self, page: PageId) -> Option<&[u8]> {
        self.zip.get(&page).map(|z| &**z)
    }

    fn sync_zip(&mut self, page: PageId, mtr: &Mtr) {
        debug_assert!(mtr.is_page_x_latched(page));
        if let (Some(zip), Some(frame)) = (self.zip.get_mut(&page), self.frames.get(&page)) {
            let physical = zip.len();
            zip.copy_from_slice(&frame[..physical]);
        }
    }

    fn buffer_fix(&mut self, page: PageId) {
        *self.buf_fix.entry(page).or_default() += 1;
    }

    fn buffer_unfix(&mut self, page: PageId) {
        let count = self
            .buf_fix
            .get_mut(&page)
            .unwrap_or_else(|| panic!("page {page} is not buffer-fixed"));
        *count -= 1;
        if *count == 0 {
            self.buf_fix.remove(&page);
        }
    }
}

impl RedoLog for Memory {
    fn mtr_commit(&mut self, mtr: &mut Mtr) {
        let closed = mtr.close();
        self.stats.mtr_commits += 1;
        self.stats.redo_bytes += closed.log_len;
        self.log_used += closed.log_len;
        self.log_peak = self.log_peak.max(self.log_used);
    }

    fn check_free_space(&mut self) {
        self.stats.free_space_probes += 1;
        if self.log_used >= self.log_capacity / 2 {
            debug!("checkpoint at {} of {} redo bytes", self.log_used, self.log_capacity);
            self.log_used = 0;
            self.stats.checkpoints += 1;
        }
    }
}

impl ClusteredIndex for Memory {
    type Saved = SavedRec;

    fn rec(&self, pos: RecPos) -> &[u8] {
        &self.rec_entry(pos).bytes
    }

    fn rec_mut(&mut self, pos: RecPos) -> &mut [u8] {
        match self.recs.get_mut(&pos) {
            Some(rec) => &mut rec.bytes,
            None => panic!("no record at {pos:?}"),
        }
    }

    fn latch_rec_page(&mut self, pos: RecPos, mtr: &mut Mtr) {
        mtr.memo_push(MemoSlot::PageX(pos.page));
    }

    fn store_position(&self, pos: RecPos) -> SavedRec {
        SavedRec {
            key: self.rec_entry(pos).key,
        }
    }

    fn restore_position(&mut self, index: &IndexInfo, saved: SavedRec, mtr: &mut Mtr) -> RecPos {
        if !index.intrinsic {
            mtr.memo_push(MemoSlot::IndexX(index.id));
        }
        let Some(mut pos) = self.find_rec(saved.key) else {
            panic!("saved record {} vanished", saved.key);
        };
        if self.relocate_on_restore {
            let page = self.alloc_leaf(index.space);
            if let Some(rec) = self.recs.remove(&pos) {
                self.free_leaf(pos.page);
                pos = RecPos {
                    page,
                    heap_no: HEAP_NO_USER_LOW,
                };
                self.recs.insert(pos, rec);
                self.stats.relocations += 1;
            }
        }
        mtr.memo_push(MemoSlot::PageX(pos.page));
        pos
    }
}

impl OnlineLog for Memory {
    fn blob_alloc(&mut self, index: &IndexInfo, page_no: PageNo) {
        self.ddl_events.push(DdlEvent::BlobAlloc(index.id, page_no));
    }

    fn blob_free(&mut self, index: &IndexInfo, page_no: PageNo) {
        self.ddl_events.push(DdlEvent::BlobFree(index.id, page_no));
    }
}
