//! Damaged BLOB pages are reported, and fatal in debug builds.

use offpage_primitives::{
    fil::{FIL_PAGE_DATA, FIL_PAGE_TYPE},
    PageId, PageSize, PageType,
};

use crate::{
    context::BlobOp,
    deleter::RollbackCtx,
    reference::BlobRef,
    testing::{big_rec, enable_logging, index, payload, Fixture, SPACE},
};

const PAGE: PageSize = PageSize::uncompressed(4096);
const ZPAGE: PageSize = PageSize::new(1024, 4096);

fn stored(page_size: PageSize) -> Fixture {
    let mut fixture = Fixture::new(index(page_size), 1);
    fixture
        .store(&big_rec([(1, payload(10_000, 66))]), BlobOp::Insert)
        .unwrap();
    fixture.commit();
    fixture
}

fn set_page_type(fixture: &mut Fixture, page: PageId, ty: PageType) {
    let frame = fixture.env.frame_mut(page).unwrap();
    frame[FIL_PAGE_TYPE..FIL_PAGE_TYPE + 2].copy_from_slice(&ty.tag().to_be_bytes());
    if let Some(zip) = fixture.env.zip_image_mut(page) {
        zip[FIL_PAGE_TYPE..FIL_PAGE_TYPE + 2].copy_from_slice(&ty.tag().to_be_bytes());
    }
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "unexpected type Index"))]
fn reading_a_non_blob_page() {
    enable_logging();

    let mut fixture = stored(PAGE);
    let second = PageId::new(SPACE, fixture.chain(1)[1]);
    set_page_type(&mut fixture, second, PageType::Index);

    // Release builds return what could be read.
    let read = fixture.read_blob(1).unwrap();
    assert_eq!(read, payload(10_000, 66)[..read.len()]);
    assert!(read.len() < 10_000);
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "unexpected type ZBlob2"))]
fn reading_a_compressed_chain_out_of_order() {
    let mut fixture = stored(ZPAGE);
    let first = PageId::new(SPACE, fixture.chain(1)[0]);
    set_page_type(&mut fixture, first, PageType::ZBlob2);

    assert!(fixture.read_blob(1).unwrap().is_empty());
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "inflate of compressed BLOB page"))]
fn garbled_deflate_stream() {
    let mut fixture = stored(ZPAGE);
    let first = PageId::new(SPACE, fixture.chain(1)[0]);
    let zip = fixture.env.zip_image_mut(first).unwrap();
    zip[FIL_PAGE_DATA..FIL_PAGE_DATA + 2].copy_from_slice(&[0xff, 0xff]);

    assert!(fixture.read_blob(1).unwrap().is_empty());
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "unexpected type Allocated"))]
fn deleting_through_a_non_blob_page() {
    let mut fixture = stored(PAGE);
    let chain = fixture.chain(1);
    let second = PageId::new(SPACE, chain[1]);
    set_page_type(&mut fixture, second, PageType::Allocated);

    // Release builds stop freeing at the damaged page.
    assert_eq!(fixture.delete(1, RollbackCtx::None), 1);
    assert!(fixture.env.is_allocated(second));
    assert_eq!(fixture.field_ref(1).page_no, chain[1]);
}

// Release builds clamp the length and would allocate the clamped size.
#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "claims 281474976720656 bytes")]
fn reference_length_beyond_format_limit() {
    let mut fixture = stored(PAGE);
    let mut bytes = fixture.field_ref(1).to_bytes();
    // Top byte of the 56 bit length.
    bytes[13] = 0x01;
    let r = BlobRef::from_bytes(&bytes);
    fixture.put_field_ref(1, &r);

    fixture.read(1);
}
