//! The mini-transaction: the unit of atomically applied, redo-logged page
//! changes.
//!
//! An [`Mtr`] records which latches it holds (its memo) and how many redo bytes
//! its writes generated. Committing it, i.e. releasing its latches and
//! appending its redo, is the business of the engine's
//! [`crate::engine::RedoLog::mtr_commit`], which calls [`Mtr::close`].

use offpage_primitives::{IndexId, PageId};

/// Approximate size of a redo record header (type, space id, page number, offset).
const REDO_RECORD_HEADER: usize = 11;

/// How a mini-transaction generates redo.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum LogMode {
    /// Log all changes.
    #[default]
    All,
    /// Do not generate redo; used for intrinsic tables and bulk loads
    /// whose pages are flushed before commit.
    NoRedo,
}

/// Identifies the flush observer of a bulk load.
///
/// Pages modified under an observer are flushed by the bulk loader itself,
/// and every mini-transaction of the load must carry the same observer.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct FlushObserver(pub u64);

/// A latch or pin held by a mini-transaction.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum MemoSlot {
    /// The index tree X-lock.
    IndexX(IndexId),
    /// A page X-latch.
    PageX(PageId),
    /// A page S-latch.
    PageS(PageId),
}

/// What a committed mini-transaction hands to the redo log.
#[derive(Debug, Default)]
pub struct Closed {
    pub memo: Vec<MemoSlot>,
    pub log_len: usize,
    pub flush_observer: Option<FlushObserver>,
}

/// A mini-transaction handle.
#[derive(Debug, Default)]
pub struct Mtr {
    active: bool,
    log_mode: LogMode,
    flush_observer: Option<FlushObserver>,
    memo: Vec<MemoSlot>,
    log_len: usize,
}

impl Mtr {
    /// A mini-transaction that has not been started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the mini-transaction.
    ///
    /// The log mode and flush observer survive a commit, so a restarted
    /// mini-transaction keeps them.
    pub fn start(&mut self) {
        debug_assert!(!self.active, "mini-transaction started twice");
        debug_assert!(self.memo.is_empty());
        self.active = true;
        self.log_len = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn log_mode(&self) -> LogMode {
        self.log_mode
    }

    /// Sets the log mode, returning the previous one.
    pub fn set_log_mode(&mut self, mode: LogMode) -> LogMode {
        std::mem::replace(&mut self.log_mode, mode)
    }

    pub fn flush_observer(&self) -> Option<FlushObserver> {
        self.flush_observer
    }

    pub fn set_flush_observer(&mut self, observer: Option<FlushObserver>) {
        self.flush_observer = observer;
    }

    /// Registers a latch held until commit.
    pub fn memo_push(&mut self, slot: MemoSlot) {
        debug_assert!(self.active, "latching outside of a mini-transaction");
        self.memo.push(slot);
    }

    pub fn memo_contains(&self, slot: MemoSlot) -> bool {
        self.memo.contains(&slot)
    }

    /// Is page `page` X-latched by this mini-transaction?
    pub fn is_page_x_latched(&self, page: PageId) -> bool {
        self.memo_contains(MemoSlot::PageX(page))
    }

    /// Redo bytes generated so far.
    pub fn log_len(&self) -> usize {
        self.log_len
    }

    /// Writes a big-endian `u16` at `offset` of `buf` and logs it.
    pub fn write_u16(&mut self, buf: &mut [u8], offset: usize, value: u16) {
        self.write_bytes(buf, offset, &value.to_be_bytes());
    }

    /// Writes a big-endian `u32` at `offset` of `buf` and logs it.
    pub fn write_u32(&mut self, buf: &mut [u8], offset: usize, value: u32) {
        self.write_bytes(buf, offset, &value.to_be_bytes());
    }

    /// Writes `data` at `offset` of `buf` and logs it.
    pub fn write_bytes(&mut self, buf: &mut [u8], offset: usize, data: &[u8]) {
        buf[offset..offset + data.len()].copy_from_slice(data);
        self.log_string(data.len());
    }

    /// Logs `len` bytes written directly into a latched page.
    pub fn log_string(&mut self, len: usize) {
        debug_assert!(self.active, "writing outside of a mini-transaction");
        if self.log_mode == LogMode::All {
            self.log_len += REDO_RECORD_HEADER + len;
        }
    }

    /// Ends the mini-transaction, handing over its latches and redo.
    pub fn close(&mut self) -> Closed {
        debug_assert!(self.active, "committing a mini-transaction that was not started");
        self.active = false;
        Closed {
            memo: std::mem::take(&mut self.memo),
            log_len: std::mem::take(&mut self.log_len),
            flush_observer: self.flush_observer,
        }
    }
}
