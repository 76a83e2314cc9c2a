use std::num::NonZeroUsize;

use offpage_primitives::{
    fil::{self, FIL_PAGE_DATA, FIL_PAGE_FILE_FLUSH_LSN, FIL_PAGE_NEXT},
    PageId, PageNo, PageSize, PageType,
};
use pretty_assertions::assert_eq;

use crate::{
    context::BlobOp,
    mem::DdlEvent,
    page::{blob_payload_capacity, BLOB_HDR_PART_LEN},
    testing::{big_rec, enable_logging, index, payload, Fixture, SPACE},
    Options,
};

const PAGE: PageSize = PageSize::uncompressed(4096);
const ZPAGE: PageSize = PageSize::new(1024, 4096);

fn page_type(fixture: &Fixture, page_no: PageNo) -> PageType {
    PageType::read(fixture.env.frame(PageId::new(SPACE, page_no)).unwrap()).unwrap()
}

#[test]
fn single_page_field() {
    enable_logging();

    let mut fixture = Fixture::new(index(PAGE), 1);
    let data = payload(1000, 20);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

    let r = fixture.field_ref(1);
    assert!(r.is_committed());
    assert!(!r.is_inherited());
    assert_eq!(r.space_id, SPACE);
    assert_eq!(r.offset, FIL_PAGE_DATA as u32);
    assert_eq!(r.length(), 1000);
    assert!(fixture.offsets.is_nth_extern(1));
    assert_eq!(fixture.chain(1).len(), 1);

    assert_eq!(fixture.read_blob(1), Some(data.clone()));
    let mut full = fixture.local_prefix(1);
    full.extend_from_slice(&data);
    assert_eq!(fixture.read(1), Some(full));
}

#[test]
fn chain_is_laid_out_after_record_page() {
    enable_logging();

    let cap = blob_payload_capacity(PAGE);
    let mut fixture = Fixture::new(index(PAGE), 1);
    let data = payload(2 * cap + 100, 21);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

    let rec_page = fixture.pcur.rec.page.page_no;
    let chain = fixture.chain(1);
    assert_eq!(chain, vec![rec_page.next(), rec_page.next().next(), PageNo(rec_page.0 + 3)]);
    assert_eq!(fixture.field_ref(1).page_no, chain[0]);

    let part_lens: Vec<_> = chain
        .iter()
        .map(|&p| {
            let frame = fixture.env.frame(PageId::new(SPACE, p)).unwrap();
            fil::read_u32(frame, FIL_PAGE_DATA + BLOB_HDR_PART_LEN) as usize
        })
        .collect();
    assert_eq!(part_lens, vec![cap, cap, 100]);
    assert!(chain.iter().all(|&p| page_type(&fixture, p) == PageType::Blob));

    assert_eq!(fixture.read_blob(1), Some(data));
    assert_eq!(fixture.env.outstanding_reservations(), 0);
}

#[test]
fn empty_field_still_gets_a_page() {
    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.store(&big_rec([(1, Vec::new())]), BlobOp::Insert).unwrap();

    let r = fixture.field_ref(1);
    assert!(r.is_committed());
    assert_eq!(r.length(), 0);
    assert_eq!(fixture.chain(1).len(), 1);
    assert_eq!(fixture.read_blob(1), Some(Vec::new()));
}

#[test]
fn empty_big_rec_is_a_noop() {
    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.store(&big_rec([]), BlobOp::Insert).unwrap();

    assert!(fixture.field_ref(1).is_zero());
    assert!(!fixture.offsets.any_extern());
    assert_eq!(fixture.env.stats().free_space_probes, 0);
}

#[test]
fn fields_are_stored_independently() {
    enable_logging();

    let cap = blob_payload_capacity(PAGE);
    let mut fixture = Fixture::new(index(PAGE), 3);
    let a = payload(cap + 1, 30);
    let c = payload(10, 31);
    fixture
        .store(&big_rec([(1, a.clone()), (3, c.clone())]), BlobOp::Insert)
        .unwrap();

    assert_eq!(fixture.offsets.extern_fields().collect::<Vec<_>>(), vec![1, 3]);
    assert!(fixture.field_ref(2).is_zero());
    assert_eq!(fixture.chain(1).len(), 2);
    assert_eq!(fixture.chain(3).len(), 1);
    assert_eq!(fixture.read_blob(1), Some(a));
    assert_eq!(fixture.read_blob(3), Some(c));
}

#[test]
fn prefix_reads_stop_at_buffer_end() {
    let cap = blob_payload_capacity(PAGE);
    for page_size in [PAGE, ZPAGE] {
        let mut fixture = Fixture::new(index(page_size), 1);
        let data = payload(3 * cap, 3);
        fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

        let local = fixture.local_prefix(1);
        assert_eq!(fixture.read_prefix(1, 5), Some(local[..5].to_vec()));

        let want = local.len() + cap + 17;
        let mut expected = local.clone();
        expected.extend_from_slice(&data[..cap + 17]);
        assert_eq!(fixture.read_prefix(1, want), Some(expected));

        // A buffer larger than the value is only filled up to its length.
        let mut whole = local;
        whole.extend_from_slice(&data);
        assert_eq!(fixture.read_prefix(1, whole.len() + 1000), Some(whole));
    }
}

#[test]
fn compressed_field_roundtrip() {
    enable_logging();

    let mut fixture = Fixture::new(index(ZPAGE), 1);
    let data = payload(60_000, 5);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

    let r = fixture.field_ref(1);
    assert!(r.is_committed());
    assert_eq!(r.offset, FIL_PAGE_NEXT as u32);
    assert_eq!(r.length(), 60_000);
    assert_eq!(fixture.read_blob(1), Some(data));
}

#[test]
fn compressed_pages_carry_type_and_back_pointer() {
    let mut fixture = Fixture::new(index(ZPAGE), 1);
    // Noise does not compress, so it spans many pages.
    let data = payload(20_000, 99);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

    let chain = fixture.chain(1);
    assert!(chain.len() > 20, "chain of {} pages", chain.len());
    assert_eq!(page_type(&fixture, chain[0]), PageType::ZBlob);
    assert!(chain[1..].iter().all(|&p| page_type(&fixture, p) == PageType::ZBlob2));

    let rec_page = fixture.pcur.rec.page.page_no;
    for &p in &chain {
        let id = PageId::new(SPACE, p);
        let frame = fixture.env.frame(id).unwrap();
        assert_eq!(fil::read_u32(frame, FIL_PAGE_FILE_FLUSH_LSN), SPACE.0);
        assert_eq!(fil::read_u32(frame, FIL_PAGE_FILE_FLUSH_LSN + 4), rec_page.0);
        assert_eq!(fixture.env.zip_image(id).unwrap(), &frame[..ZPAGE.physical()]);
    }

    assert_eq!(fixture.read_blob(1), Some(data));
}

#[test]
fn sdi_page_types() {
    for (page_size, first, rest) in [
        (PAGE, PageType::SdiBlob, PageType::SdiBlob),
        (ZPAGE, PageType::SdiZBlob, PageType::SdiZBlob),
    ] {
        let mut index = index(page_size);
        index.is_sdi = true;
        let mut fixture = Fixture::new(index, 1);
        let data = payload(3 * page_size.physical(), 77);
        fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

        let chain = fixture.chain(1);
        assert!(chain.len() > 1);
        assert_eq!(page_type(&fixture, chain[0]), first);
        assert!(chain[1..].iter().all(|&p| page_type(&fixture, p) == rest));
        assert_eq!(fixture.read_blob(1), Some(data));
    }
}

#[test]
fn redo_log_is_checked_around_fields_and_every_commit_freq_pages() {
    let cap = blob_payload_capacity(PAGE);
    let data = payload(3 * cap, 40);

    let mut fixture = Fixture::new(index(PAGE), 1);
    let opts = Options {
        commit_freq: NonZeroUsize::MIN,
        ..Options::default()
    };
    fixture
        .store_with(&big_rec([(1, data.clone())]), BlobOp::Insert, None, &opts)
        .unwrap();
    // Before and after the field, and before pages 2 and 3.
    assert_eq!(fixture.env.stats().free_space_probes, 4);

    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.store(&big_rec([(1, data)]), BlobOp::Insert).unwrap();
    assert_eq!(fixture.env.stats().free_space_probes, 2);
}

#[test]
fn default_cadence_checks_redo_log_mid_field() {
    let cap = blob_payload_capacity(PAGE);
    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture
        .store(&big_rec([(1, payload(6 * cap, 42))]), BlobOp::Insert)
        .unwrap();

    assert_eq!(fixture.chain(1).len(), 6);
    // Before and after the field, and before page 5.
    assert_eq!(fixture.env.stats().free_space_probes, 3);
}

#[test]
#[cfg_attr(
    debug_assertions,
    should_panic(expected = "invalid external reference after compressed store")
)]
fn compressed_store_checks_every_external_reference() {
    let mut fixture = Fixture::new(index(ZPAGE), 2);
    // Flagged external, but never written.
    fixture.offsets.make_nth_extern(2);
    fixture
        .store(&big_rec([(1, payload(3000, 5))]), BlobOp::Insert)
        .unwrap();
    assert!(fixture.field_ref(1).is_committed());
}

#[test]
fn uncompressed_store_checks_only_its_own_fields() {
    let mut fixture = Fixture::new(index(PAGE), 2);
    fixture.offsets.make_nth_extern(2);
    fixture
        .store(&big_rec([(1, payload(3000, 5))]), BlobOp::Insert)
        .unwrap();
    assert!(fixture.field_ref(1).is_committed());
    assert!(fixture.field_ref(2).is_zero());
}

#[test]
fn redo_log_pressure_causes_checkpoints() {
    enable_logging();

    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.env.set_log_capacity(8 * 1024);
    let data = payload(100_000, 41);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();

    let stats = fixture.env.stats();
    assert!(stats.checkpoints > 0);
    assert!(fixture.env.log_peak() * 3 < stats.redo_bytes);
    assert_eq!(fixture.read_blob(1), Some(data));
}

#[test]
fn cursor_follows_relocated_record() {
    enable_logging();

    let mut fixture = Fixture::new(index(PAGE), 2);
    fixture.env.set_relocate_on_restore(true);
    let before = fixture.pcur.rec;
    let a = payload(10_000, 50);
    let b = payload(100, 51);
    fixture
        .store(&big_rec([(1, a.clone()), (2, b.clone())]), BlobOp::Update)
        .unwrap();

    assert_ne!(fixture.pcur.rec, before);
    assert!(fixture.env.stats().relocations > 0);
    assert!(fixture.mtr.is_page_x_latched(fixture.pcur.rec.page));
    assert!(fixture.field_ref(1).is_committed());
    assert_eq!(fixture.read_blob(1), Some(a));
    assert_eq!(fixture.read_blob(2), Some(b));
}

#[test]
fn bulk_insert_pins_record_instead_of_repositioning() {
    let mut fixture = Fixture::new(index(PAGE), 1);
    fixture.bulk();
    fixture.env.set_relocate_on_restore(true);
    let before = fixture.pcur.rec;
    let data = payload(20_000, 52);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::InsertBulk).unwrap();

    assert_eq!(fixture.pcur.rec, before);
    assert_eq!(fixture.env.stats().relocations, 0);
    assert_eq!(fixture.env.buf_fix_count(before.page), 0);
    assert_eq!(fixture.env.stats().redo_bytes, 0);
    assert_eq!(fixture.read_blob(1), Some(data));
}

#[test]
fn online_ddl_is_told_about_new_chains() {
    let mut index = index(PAGE);
    index.online_ddl = true;
    let id = index.id;
    let mut fixture = Fixture::new(index, 2);
    fixture
        .store(&big_rec([(1, payload(9000, 60)), (2, payload(10, 61))]), BlobOp::Insert)
        .unwrap();

    let (first_a, first_b) = (fixture.chain(1)[0], fixture.chain(2)[0]);
    assert_eq!(
        fixture.env.ddl_events(),
        &[DdlEvent::BlobAlloc(id, first_a), DdlEvent::BlobAlloc(id, first_b)]
    );
}

#[test]
fn intrinsic_index_needs_no_index_lock() {
    let mut index = index(PAGE);
    index.intrinsic = true;
    let mut fixture = Fixture::new(index, 1);
    let data = payload(5000, 62);
    fixture.store(&big_rec([(1, data.clone())]), BlobOp::Insert).unwrap();
    assert_eq!(fixture.read_blob(1), Some(data));
}
