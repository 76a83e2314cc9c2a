use offpage_primitives::SpaceId;
use thiserror::Error;

/// The tablespace has no room for the requested pages.
///
/// Returned by [`crate::engine::FileSpace`] when extent reservation or page
/// allocation fails.
#[derive(Debug, Error)]
#[error("out of file space: cannot reserve {n_pages} page(s) in space={space}")]
pub struct OutOfFileSpace {
    pub space: SpaceId,
    pub n_pages: usize,
}

/// Error returned by [`crate::store_external_fields`].
#[derive(Debug, Error)]
pub enum Store {
    /// Storing field `field_no` ran out of space.
    ///
    /// Fields stored before `field_no` are complete and owned. The field
    /// itself may have a partially written chain which its reference does not
    /// own; those pages are garbage to be reclaimed later.
    #[error("failed to store external field {field_no}")]
    OutOfFileSpace {
        field_no: usize,
        #[source]
        source: OutOfFileSpace,
    },
}
