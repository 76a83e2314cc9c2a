//! Writing BLOB chains.
//!
//! [`write_fields`] drives the writing of every field of a [`BigRec`]
//! and keeps the redo log in check. The page format is up to a
//! [`PageWriter`]: [`UncompressedWriter`] or [`CompressedWriter`].
//!
//! [`BigRec`]: crate::rec::BigRec

use log::{debug, warn};
use offpage_primitives::PageNo;

use crate::{context::BlobWriteContext, engine::Engine, error, mtr::Mtr, rec::BigRecField};

mod compressed;
mod uncompressed;

pub(crate) use compressed::CompressedWriter;
pub(crate) use uncompressed::UncompressedWriter;

/// The chain of one field under construction.
#[derive(Debug)]
pub(crate) struct Chain {
    pub field_no: usize,
    /// The first page, or [`PageNo::NULL`] before any page was allocated.
    pub first: PageNo,
    /// The most recently written page.
    pub prev: PageNo,
    pub n_pages: usize,
    /// Bytes of the field consumed so far.
    pub stored: usize,
}

impl Chain {
    fn new(field_no: usize) -> Self {
        Self {
            field_no,
            first: PageNo::NULL,
            prev: PageNo::NULL,
            n_pages: 0,
            stored: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n_pages == 0
    }

    /// Allocates the next page of the chain, X-latched in `mtr`.
    ///
    /// The page is placed right after the previous one if possible, and the
    /// first page right after the record page.
    pub fn alloc_page<E: Engine>(
        &mut self,
        ctx: &mut BlobWriteContext<'_, E>,
        mtr: &mut Mtr,
    ) -> Result<PageNo, error::Store> {
        let space = ctx.space();
        let hint = if self.prev.is_null() {
            ctx.rec_pos().page.page_no.next()
        } else {
            self.prev.next()
        };
        let field_no = self.field_no;
        let oos = |source| error::Store::OutOfFileSpace { field_no, source };

        let reservation = ctx.env().reserve_free_extents(space, 1, mtr).map_err(oos)?;
        let page_no = ctx.env().alloc_page(space, hint, mtr);
        ctx.env().release_free_extents(reservation);
        let page_no = page_no.map_err(oos)?;

        if self.first.is_null() {
            self.first = page_no;
            ctx.notify_blob_alloc(page_no);
        }
        Ok(page_no)
    }

    /// Records that `page_no` now holds the next `consumed` bytes of the field.
    pub fn page_written(&mut self, page_no: PageNo, consumed: usize) {
        self.prev = page_no;
        self.n_pages += 1;
        self.stored += consumed;
    }
}

/// Writes the pages of one chain in a particular format.
pub(crate) trait PageWriter: Sized {
    /// Prepares for writing `field`.
    fn start_field(&mut self, field: &BigRecField);

    /// Allocates, fills and links the next page of `chain`, and updates the
    /// field reference accordingly. All page changes go to `mtr`.
    ///
    /// Returns `true` once `field` is completely stored.
    fn write_page<E: Engine>(
        &mut self,
        ctx: &mut BlobWriteContext<'_, E>,
        chain: &mut Chain,
        field: &BigRecField,
        mtr: &mut Mtr,
    ) -> Result<bool, error::Store>;

    /// Called once all fields are stored.
    fn finish<E: Engine>(self, _ctx: &mut BlobWriteContext<'_, E>) {}
}

/// Stores every field of the context's [`BigRec`](crate::rec::BigRec),
/// in order.
///
/// Stops at the first field that cannot be stored. Fields before it are
/// complete and owned.
pub(crate) fn write_fields<E: Engine, W: PageWriter>(
    ctx: &mut BlobWriteContext<'_, E>,
    mut writer: W,
) -> Result<(), error::Store> {
    let big_rec = ctx.big_rec();
    let commit_freq = ctx.opts().commit_freq.get();

    for field in &big_rec.fields {
        ctx.check_redolog();
        write_field(ctx, &mut writer, field, commit_freq)?;
        ctx.check_redolog();
    }
    writer.finish(ctx);

    Ok(())
}

fn write_field<E: Engine, W: PageWriter>(
    ctx: &mut BlobWriteContext<'_, E>,
    writer: &mut W,
    field: &BigRecField,
    commit_freq: usize,
) -> Result<(), error::Store> {
    let field_no = field.field_no;

    let mut r = ctx.field_ref(field_no);
    debug_assert!(
        r.is_zero() || (!r.is_owner() && r.is_inherited()),
        "field {field_no} is not ready to be stored: {r:?}"
    );
    // Until the chain is complete, this row version does not own it.
    r.set_owner(false);
    r.set_inherited(false);
    ctx.set_field_ref(field_no, &r);

    writer.start_field(field);
    let mut chain = Chain::new(field_no);
    loop {
        if !chain.is_empty() && chain.n_pages % commit_freq == 0 {
            ctx.check_redolog();
        }

        let mut mtr = ctx.start_blob_mtr();
        let res = writer.write_page(ctx, &mut chain, field, &mut mtr);
        ctx.commit_blob_mtr(&mut mtr);

        match res {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                warn!(
                    "{e}: {} of {} bytes written to {} page(s)",
                    chain.stored,
                    field.data.len(),
                    chain.n_pages
                );
                return Err(e);
            }
        }
    }

    let mut r = ctx.field_ref(field_no);
    debug_assert_eq!(r.page_no, chain.first);
    debug_assert_eq!(r.length(), field.data.len() as u64);
    r.set_owner(true);
    ctx.set_field_ref(field_no, &r);
    ctx.make_nth_extern(field_no);

    debug!(
        "stored field {field_no}: {} bytes in {} page(s) starting at {}",
        field.data.len(),
        chain.n_pages,
        r.page_id()
    );

    Ok(())
}
