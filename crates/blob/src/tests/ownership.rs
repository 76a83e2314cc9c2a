use offpage_primitives::PageSize;
use pretty_assertions::assert_eq;

use crate::{
    context::BlobOp,
    deleter::RollbackCtx,
    disown_inherited_fields, mark_inherited_fields,
    rec::UpdateVector,
    testing::{big_rec, index, payload, Fixture},
    unmark_extern_fields, Options,
};

const PAGE: PageSize = PageSize::uncompressed(4096);

fn stored(n: usize) -> Fixture {
    let mut fixture = Fixture::new(index(PAGE), n);
    let fields = (1..=n).map(|i| (i, payload(5000, i as u64 + 20)));
    fixture.store(&big_rec(fields), BlobOp::Insert).unwrap();
    fixture.commit();
    fixture
}

#[test]
fn update_hands_kept_chains_to_the_new_version() {
    let mut fixture = stored(3);
    let update = UpdateVector::new([2]);
    let rec = fixture.pcur.rec;

    mark_inherited_fields(&mut fixture.env, rec, &fixture.offsets, &update, &mut fixture.mtr);
    disown_inherited_fields(&mut fixture.env, rec, &fixture.offsets, &update, &mut fixture.mtr);

    for n in [1, 3] {
        let r = fixture.field_ref(n);
        assert!(r.is_inherited());
        assert!(!r.is_owner());
    }
    let r = fixture.field_ref(2);
    assert!(!r.is_inherited());
    assert!(r.is_owner());

    // The old version no longer frees the kept chains.
    assert_eq!(fixture.delete(1, RollbackCtx::None), 0);
    assert_eq!(fixture.read_blob(1), Some(payload(5000, 21)));
}

#[test]
fn rollback_takes_ownership_back() {
    let mut fixture = stored(2);
    let update = UpdateVector::new([]);
    let rec = fixture.pcur.rec;

    disown_inherited_fields(&mut fixture.env, rec, &fixture.offsets, &update, &mut fixture.mtr);
    assert!(!fixture.field_ref(1).is_owner());
    assert!(!fixture.field_ref(2).is_owner());

    unmark_extern_fields(&mut fixture.env, rec, &fixture.offsets, &mut fixture.mtr);
    assert!(fixture.field_ref(1).is_committed());
    assert!(fixture.field_ref(2).is_committed());
    assert_eq!(fixture.delete(2, RollbackCtx::None), 2);
}

#[test]
fn zero_references_are_left_alone() {
    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.offsets.make_nth_extern(1);
    let rec = fixture.pcur.rec;
    let update = UpdateVector::new([]);

    mark_inherited_fields(&mut fixture.env, rec, &fixture.offsets, &update, &mut fixture.mtr);
    disown_inherited_fields(&mut fixture.env, rec, &fixture.offsets, &update, &mut fixture.mtr);
    assert!(fixture.field_ref(1).is_zero());
    assert_eq!(fixture.read(1), None);
    assert_eq!(fixture.read_prefix(1, 8), None);
}

#[test]
fn unchanged_references_are_not_logged() {
    let mut fixture = stored(1);
    let rec = fixture.pcur.rec;
    let before = fixture.mtr.log_len();
    unmark_extern_fields(&mut fixture.env, rec, &fixture.offsets, &mut fixture.mtr);
    assert_eq!(fixture.mtr.log_len(), before);
}

#[test]
fn updated_field_is_rewritten_over_inherited_reference() {
    let mut fixture = stored(2);
    let old = fixture.field_ref(2);

    // The new row version inherited field 2, then the update replaced it.
    let mut r = old;
    r.set_owner(false);
    r.set_inherited(true);
    fixture.put_field_ref(2, &r);

    let data = payload(7000, 80);
    fixture
        .store_with(
            &big_rec([(2, data.clone())]),
            BlobOp::Update,
            Some(&UpdateVector::new([1])),
            &Options::default(),
        )
        .unwrap();

    let new = fixture.field_ref(2);
    assert!(new.is_committed());
    assert!(!new.is_inherited());
    assert_ne!(new.page_no, old.page_no);
    assert_eq!(fixture.read_blob(2), Some(data));
}
