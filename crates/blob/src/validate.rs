//! Consistency checks of the references of a record.

use log::error;

use crate::rec::{BigRec, RecOffsets, UpdateVector};

/// Checks that every externally stored field of `rec` carries a reference
/// to an actual chain.
///
/// Logs each offending field.
pub fn extern_refs_valid(rec: &[u8], offsets: &RecOffsets) -> bool {
    offsets.extern_fields().fold(true, |ok, n| {
        let r = offsets.field_ref(rec, n);
        if r.is_zero() || r.is_null_page() {
            error!("externally stored field {n} has invalid reference {r:?}");
            return false;
        }
        ok
    })
}

/// Checks that all fields of `big_rec` are flagged external and own a
/// complete chain.
pub(crate) fn big_rec_stored(rec: &[u8], offsets: &RecOffsets, big_rec: &BigRec) -> bool {
    big_rec.fields.iter().all(|f| {
        let r = offsets.field_ref(rec, f.field_no);
        let ok = offsets.is_nth_extern(f.field_no) && r.is_committed() && r.length() == f.data.len() as u64;
        if !ok {
            error!("field {} was not stored: {r:?}", f.field_no);
        }
        ok
    })
}

/// Checks that the fields of `big_rec` can be written.
///
/// During an update, a field may still carry the disowned reference it
/// inherited from the previous row version. Otherwise it must not have
/// been written yet.
pub(crate) fn big_rec_writable(
    rec: &[u8],
    offsets: &RecOffsets,
    big_rec: &BigRec,
    update: Option<&UpdateVector>,
) -> bool {
    big_rec.fields.iter().all(|f| {
        let r = offsets.field_ref(rec, f.field_no);
        let inherited = !r.is_owner() && r.is_inherited();
        let ok = r.is_zero() || (inherited && update.is_some());
        if !ok {
            error!("field {} cannot be stored over {r:?}", f.field_no);
        }
        ok
    })
}
