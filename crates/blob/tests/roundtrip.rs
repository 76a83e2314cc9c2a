use std::num::NonZeroUsize;

use offpage_blob::{
    mem::Memory,
    testing::{big_rec, enable_logging, index, payload, Fixture, SPACE},
    BlobOp, Options, RollbackCtx,
};
use offpage_primitives::PageSize;
use proptest::prelude::*;

fn page_size() -> impl Strategy<Value = PageSize> {
    prop_oneof![
        Just(PageSize::uncompressed(4096)),
        Just(PageSize::uncompressed(16384)),
        Just(PageSize::new(1024, 4096)),
        Just(PageSize::new(2048, 16384)),
    ]
}

fn leaf_pages_only(env: &Memory) -> bool {
    env.n_allocated(SPACE) == 1
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn store_read_delete(
        page_size in page_size(),
        lens in prop::collection::vec(0usize..40_000, 1..4),
        seed in any::<u64>(),
        commit_freq in 1usize..6,
        level in 0u32..=9,
    ) {
        enable_logging();

        let mut fixture = Fixture::new(index(page_size), lens.len());
        let values: Vec<_> = lens
            .iter()
            .enumerate()
            .map(|(i, &len)| payload(len, seed.wrapping_add(i as u64)))
            .collect();
        let opts = Options {
            commit_freq: NonZeroUsize::new(commit_freq).unwrap(),
            compression_level: level,
        };
        fixture
            .store_with(
                &big_rec(values.iter().cloned().enumerate().map(|(i, v)| (i + 1, v))),
                BlobOp::Insert,
                None,
                &opts,
            )
            .unwrap();
        fixture.commit();

        for (i, value) in values.iter().enumerate() {
            let n = i + 1;
            let r = fixture.field_ref(n);
            prop_assert!(r.is_committed());
            prop_assert_eq!(r.length(), value.len() as u64);
            let read = fixture.read_blob(n);
            prop_assert_eq!(read.as_ref(), Some(value));

            let local = fixture.local_prefix(n);
            let cut = value.len() / 3;
            let mut prefix = local.clone();
            prefix.extend_from_slice(&value[..cut]);
            prop_assert_eq!(fixture.read_prefix(n, local.len() + cut), Some(prefix));
        }

        for n in 1..=values.len() {
            let chain = fixture.chain(n).len();
            prop_assert_eq!(fixture.delete(n, RollbackCtx::None), chain);
        }
        prop_assert!(leaf_pages_only(&fixture.env));
        prop_assert_eq!(fixture.env.stats().pages_allocated, fixture.env.stats().pages_freed);
    }

    #[test]
    fn compression_never_grows_chain_beyond_stored_size(len in 1usize..60_000, seed in 0u64..16) {
        let zpage = PageSize::new(1024, 16384);
        let mut fixture = Fixture::new(index(zpage), 1);
        fixture.store(&big_rec([(1, payload(len, seed))]), BlobOp::Insert).unwrap();

        // Repetitive payloads deflate well below one byte per byte.
        let max_pages = len / (zpage.physical() - 38) + 1;
        prop_assert!(fixture.chain(1).len() <= max_pages);
        prop_assert_eq!(fixture.read_blob(1), Some(payload(len, seed)));
    }
}
