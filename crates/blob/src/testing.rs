//! Helpers for tests of this crate and its dependents.

use std::iter;

use env_logger::Env;
use offpage_primitives::{
    fil::{self, FIL_PAGE_DATA, FIL_PAGE_NEXT},
    IndexId, PageId, PageNo, PageSize, SpaceId,
};
use typed_arena::Arena;

use crate::{
    context::BlobOp,
    deleter::{BlobDeleter, RollbackCtx},
    engine::{ClusteredIndex, IndexInfo, Pcur, RedoLog},
    error,
    mem::Memory,
    mtr::{FlushObserver, LogMode, MemoSlot, Mtr},
    page::BLOB_HDR_NEXT_PAGE_NO,
    reader::{copy_externally_stored_field, copy_externally_stored_field_prefix},
    rec::{BigRec, BigRecField, RecOffsets, UpdateVector},
    reference::{BlobRef, FIELD_REF_SIZE},
    store::store_external_fields,
    Options,
};

pub fn enable_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("debug"))
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

pub const SPACE: SpaceId = SpaceId(7);

/// The length of the local prefix of each BLOB field in a [`Fixture`] record.
pub const LOCAL_PREFIX: usize = 16;

/// A clustered index in [`SPACE`].
pub fn index(page_size: PageSize) -> IndexInfo {
    IndexInfo {
        id: IndexId(42),
        space: SPACE,
        page_size,
        is_sdi: false,
        online_ddl: false,
        intrinsic: false,
    }
}

/// `len` bytes of a deterministic sequence.
///
/// Low `seed`s give compressible data, high ones give noise.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    (0..len)
        .map(|i| {
            if seed < 16 {
                (i % (seed as usize + 7)) as u8
            } else {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            }
        })
        .collect()
}

pub fn big_rec(fields: impl IntoIterator<Item = (usize, Vec<u8>)>) -> BigRec {
    BigRec::new(
        fields
            .into_iter()
            .map(|(field_no, data)| BigRecField { field_no, data })
            .collect(),
    )
}

/// One record of an index, with a key field followed by BLOB fields, and a
/// started mini-transaction holding the latches needed to modify it.
pub struct Fixture {
    pub env: Memory,
    pub pcur: Pcur,
    pub offsets: RecOffsets,
    pub mtr: Mtr,
}

impl Fixture {
    /// A record whose fields `1..=n_blobs` each hold a [`LOCAL_PREFIX`] and a
    /// zero reference.
    pub fn new(index: IndexInfo, n_blobs: usize) -> Self {
        let mut env = Memory::new();
        env.create_space(index.space, index.page_size);

        let lens = iter::once(8).chain(iter::repeat_n(LOCAL_PREFIX + FIELD_REF_SIZE, n_blobs));
        let offsets = RecOffsets::from_lens(lens);
        let mut rec = vec![0; offsets.data_size()];
        rec[..8].copy_from_slice(&0xfeed_u64.to_be_bytes());
        for n in 1..=n_blobs {
            let start = offsets.nth_field(n).start;
            rec[start..start + LOCAL_PREFIX].fill(b'a' + n as u8);
        }
        let rec = env.insert_rec(&index, rec);

        let mut fixture = Self {
            env,
            pcur: Pcur { index, rec },
            offsets,
            mtr: Mtr::new(),
        };
        fixture.relatch();
        fixture
    }

    /// Starts the mini-transaction and latches the index and record.
    pub fn relatch(&mut self) {
        self.mtr.start();
        if !self.pcur.index.intrinsic {
            self.mtr.memo_push(MemoSlot::IndexX(self.pcur.index.id));
        }
        self.env.latch_rec_page(self.pcur.rec, &mut self.mtr);
    }

    /// Commits the mini-transaction and starts a new one.
    pub fn commit(&mut self) {
        self.env.mtr_commit(&mut self.mtr);
        self.relatch();
    }

    /// Switches to a bulk load: no redo, under a flush observer.
    pub fn bulk(&mut self) {
        self.mtr.set_log_mode(LogMode::NoRedo);
        self.mtr.set_flush_observer(Some(FlushObserver(1)));
    }

    pub fn store(&mut self, big_rec: &BigRec, op: BlobOp) -> Result<(), error::Store> {
        self.store_with(big_rec, op, None, &Options::default())
    }

    pub fn store_with(
        &mut self,
        big_rec: &BigRec,
        op: BlobOp,
        update: Option<&UpdateVector>,
        opts: &Options,
    ) -> Result<(), error::Store> {
        store_external_fields(
            &mut self.env,
            &mut self.pcur,
            update,
            &mut self.offsets,
            big_rec,
            &mut self.mtr,
            op,
            opts,
        )
    }

    pub fn rec(&self) -> &[u8] {
        self.env.rec(self.pcur.rec)
    }

    pub fn field_ref(&self, field_no: usize) -> BlobRef {
        self.offsets.field_ref(self.rec(), field_no)
    }

    /// Overwrites the reference of `field_no`, bypassing redo.
    pub fn put_field_ref(&mut self, field_no: usize, r: &BlobRef) {
        let range = self.offsets.field_ref_range(field_no).unwrap();
        self.env.rec_mut(self.pcur.rec)[range].copy_from_slice(&r.to_bytes());
    }

    pub fn local_prefix(&self, field_no: usize) -> Vec<u8> {
        let start = self.offsets.nth_field(field_no).start;
        self.rec()[start..start + self.offsets.local_len(field_no)].to_vec()
    }

    /// The full value of `field_no`: local prefix and off-page bytes.
    pub fn read(&mut self, field_no: usize) -> Option<Vec<u8>> {
        let rec = self.rec().to_vec();
        let heap = Arena::new();
        let index = &self.pcur.index;
        copy_externally_stored_field(
            &mut self.env,
            &rec,
            &self.offsets,
            index.page_size,
            field_no,
            index.is_sdi,
            &heap,
        )
        .map(<[u8]>::to_vec)
    }

    /// The off-page bytes of `field_no`, without the local prefix.
    pub fn read_blob(&mut self, field_no: usize) -> Option<Vec<u8>> {
        let local = self.offsets.local_len(field_no);
        self.read(field_no).map(|v| v[local..].to_vec())
    }

    /// The first `len` bytes of `field_no`.
    pub fn read_prefix(&mut self, field_no: usize, len: usize) -> Option<Vec<u8>> {
        let rec = self.rec().to_vec();
        let mut buf = vec![0; len];
        let index = &self.pcur.index;
        let n = copy_externally_stored_field_prefix(
            &mut self.env,
            &rec,
            &self.offsets,
            index.page_size,
            field_no,
            index.is_sdi,
            &mut buf,
        )?;
        buf.truncate(n);
        Some(buf)
    }

    /// The pages of the chain of `field_no`, following the next-page pointers.
    pub fn chain(&self, field_no: usize) -> Vec<PageNo> {
        let r = self.field_ref(field_no);
        let compressed = self.pcur.index.page_size.is_compressed();
        let mut pages = Vec::new();
        let mut page_no = r.page_no;
        while !page_no.is_null() && !r.is_zero() {
            pages.push(page_no);
            let frame = self
                .env
                .frame(PageId::new(r.space_id, page_no))
                .unwrap_or_else(|| panic!("chain of field {field_no} reaches free page {page_no}"));
            let next = if compressed {
                FIL_PAGE_NEXT
            } else {
                FIL_PAGE_DATA + BLOB_HDR_NEXT_PAGE_NO
            };
            page_no = PageNo(fil::read_u32(frame, next));
        }
        pages
    }

    pub fn delete(&mut self, field_no: usize, rb_ctx: RollbackCtx) -> usize {
        BlobDeleter::new(
            &mut self.env,
            &self.pcur.index,
            self.pcur.rec,
            &self.offsets,
            field_no,
            rb_ctx,
            &self.mtr,
        )
        .destroy()
    }
}
