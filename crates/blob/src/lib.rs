use std::num::NonZeroUsize;

/// Reports a violated on-disk invariant, naming the page involved.
///
/// Debug builds panic. Release builds log the error and let the caller
/// carry on with whatever it managed to do.
macro_rules! corruption {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        }
    }};
}

mod context;
mod deleter;
pub mod engine;
pub mod error;
pub mod mtr;
mod ownership;
pub mod page;
pub mod reader;
pub mod rec;
pub mod reference;
mod store;
mod validate;
mod writer;

#[cfg(any(test, feature = "test"))]
pub mod mem;
#[cfg(any(test, feature = "test"))]
pub mod testing;


pub use crate::{
    context::{BlobOp, BlobWriteContext},
    deleter::{BlobDeleter, RollbackCtx},
    engine::{Engine, IndexInfo, Pcur},
    ownership::{
        disown_inherited_fields, free_externally_stored_fields, free_updated_extern_fields, mark_inherited_fields,
        unmark_extern_fields,
    },
    reader::{copy_externally_stored_field, copy_externally_stored_field_prefix},
    reference::{BlobRef, FIELD_REF_SIZE},
    store::store_external_fields,
    validate::extern_refs_valid,
};

/// [`store_external_fields`] options.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Options {
    /// The number of BLOB pages written between two checks for free redo
    /// log space.
    ///
    /// Each check commits the mini-transaction holding the clustered index
    /// record, which bounds the redo a single long BLOB write can pin.
    /// Free space is also checked before and after every field.
    ///
    /// Default: 4
    pub commit_freq: NonZeroUsize,
    /// The zlib compression level used for BLOBs in compressed tablespaces,
    /// from 0 (store) to 9 (best).
    ///
    /// Default: 6
    pub compression_level: u32,
}

impl Options {
    pub const DEFAULT_COMMIT_FREQ: NonZeroUsize = NonZeroUsize::new(4).unwrap();
}

impl Default for Options {
    fn default() -> Self {
        Self {
            commit_freq: Self::DEFAULT_COMMIT_FREQ,
            compression_level: 6,
        }
    }
}
