use log::debug;

use crate::{
    context::{BlobOp, BlobWriteContext},
    engine::{Engine, Pcur},
    error,
    mtr::Mtr,
    rec::{BigRec, RecOffsets, UpdateVector},
    validate,
    writer::{self, CompressedWriter, UncompressedWriter},
    Options,
};

/// Moves the fields of `big_rec` off-page and points the record's
/// references at the new chains.
///
/// `mtr` must hold the index X-lock (unless `op` is a bulk insert) and the
/// record page X-latch. It is committed and restarted periodically to make
/// room in the redo log, so the record may move and `pcur` is kept up to
/// date. A bulk insert must run under a flush observer.
///
/// `update` names the fields modified by an update, if any.
///
/// On success, every stored field is flagged external in `offsets` and its
/// reference is owned.
#[allow(clippy::too_many_arguments)]
pub fn store_external_fields<E: Engine>(
    env: &mut E,
    pcur: &mut Pcur,
    update: Option<&UpdateVector>,
    offsets: &mut RecOffsets,
    big_rec: &BigRec,
    mtr: &mut Mtr,
    op: BlobOp,
    opts: &Options,
) -> Result<(), error::Store> {
    debug_assert!(
        !op.is_bulk() || mtr.flush_observer().is_some(),
        "bulk insert without flush observer"
    );
    debug_assert!(update.is_none() || op.is_update());
    debug_assert!(validate::big_rec_writable(
        env.rec(pcur.rec),
        offsets,
        big_rec,
        update
    ));

    if big_rec.is_empty() {
        return Ok(());
    }

    let page_size = pcur.index.page_size;
    let mut ctx = BlobWriteContext::new(env, pcur, offsets, big_rec, mtr, op, opts);
    if page_size.is_compressed() {
        writer::write_fields(&mut ctx, CompressedWriter::new(page_size, opts))?;
    } else {
        writer::write_fields(&mut ctx, UncompressedWriter::new(page_size))?;
    }

    debug_assert!(validate::big_rec_stored(ctx.rec(), ctx.offsets(), big_rec));
    debug!(
        "stored {} field(s) of record {:?} with {} redo log check(s)",
        big_rec.fields.len(),
        ctx.rec_pos(),
        ctx.redolog_checks()
    );

    Ok(())
}
