//! Passing BLOB ownership between row versions.
//!
//! When an update keeps a column's external value, the new row version
//! inherits the chain and the old version, kept for rollback and MVCC,
//! disowns it. If the update rolls back, the old version takes ownership
//! back. Only an owning version ever frees a chain.

use log::debug;

use crate::{
    deleter::{BlobDeleter, RollbackCtx},
    engine::{ClusteredIndex, Engine, IndexInfo},
    mtr::Mtr,
    rec::{RecOffsets, RecPos, UpdateVector},
    reference::BlobRef,
};

/// Applies `f` to the reference of external field `n`, writing it back in
/// `mtr` if it changed.
fn update_field_ref<E: ClusteredIndex>(
    env: &mut E,
    rec: RecPos,
    offsets: &RecOffsets,
    n: usize,
    mtr: &mut Mtr,
    f: impl FnOnce(&mut BlobRef),
) {
    debug_assert!(mtr.is_page_x_latched(rec.page));
    let range = offsets.ref_range_or_panic(n);
    let old = BlobRef::from_bytes(&env.rec(rec)[range.clone()]);
    if old.is_zero() {
        return;
    }
    let mut new = old;
    f(&mut new);
    if new != old {
        mtr.write_bytes(env.rec_mut(rec), range.start, &new.to_bytes());
    }
}

/// Flags the external fields of `rec` that `update` does not touch as
/// inherited from the previous row version.
pub fn mark_inherited_fields<E: ClusteredIndex>(
    env: &mut E,
    rec: RecPos,
    offsets: &RecOffsets,
    update: &UpdateVector,
    mtr: &mut Mtr,
) {
    for n in offsets.extern_fields().filter(|&n| !update.contains(n)) {
        update_field_ref(env, rec, offsets, n, mtr, |r| r.set_inherited(true));
    }
}

/// Gives up ownership of the external fields of `rec` that `update` does
/// not touch, as they now belong to the updated row version.
pub fn disown_inherited_fields<E: ClusteredIndex>(
    env: &mut E,
    rec: RecPos,
    offsets: &RecOffsets,
    update: &UpdateVector,
    mtr: &mut Mtr,
) {
    for n in offsets.extern_fields().filter(|&n| !update.contains(n)) {
        update_field_ref(env, rec, offsets, n, mtr, |r| r.set_owner(false));
    }
}

/// Takes back ownership of all external fields of `rec`, when rolling
/// back the update that disowned them.
pub fn unmark_extern_fields<E: ClusteredIndex>(env: &mut E, rec: RecPos, offsets: &RecOffsets, mtr: &mut Mtr) {
    for n in offsets.extern_fields() {
        update_field_ref(env, rec, offsets, n, mtr, |r| r.set_owner(true));
    }
}

/// Frees the chains of all external fields of `rec` owned by it.
///
/// Returns the number of pages freed.
pub fn free_externally_stored_fields<E: Engine>(
    env: &mut E,
    index: &IndexInfo,
    rec: RecPos,
    offsets: &RecOffsets,
    rb_ctx: RollbackCtx,
    mtr: &Mtr,
) -> usize {
    let mut n_pages = 0;
    for n in offsets.extern_fields() {
        n_pages += BlobDeleter::new(env, index, rec, offsets, n, rb_ctx, mtr).destroy();
    }
    debug!("freed {n_pages} BLOB page(s) of record {rec:?}");
    n_pages
}

/// Frees the chains of the external fields of `rec` that `update`
/// replaced.
///
/// Returns the number of pages freed.
pub fn free_updated_extern_fields<E: Engine>(
    env: &mut E,
    index: &IndexInfo,
    rec: RecPos,
    offsets: &RecOffsets,
    update: &UpdateVector,
    rb_ctx: RollbackCtx,
    mtr: &Mtr,
) -> usize {
    let mut n_pages = 0;
    for &n in update.field_nos() {
        if n < offsets.n_fields() && offsets.is_nth_extern(n) {
            n_pages += BlobDeleter::new(env, index, rec, offsets, n, rb_ctx, mtr).destroy();
        }
    }
    n_pages
}
