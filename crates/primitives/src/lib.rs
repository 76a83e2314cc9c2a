#![cfg_attr(not(test), no_std)]

pub mod fil;
mod ids;
mod page_size;

pub use fil::PageType;
pub use ids::{IndexId, PageId, PageNo, SpaceId};
pub use page_size::PageSize;

/// The "no page" sentinel stored in page links and references.
pub const FIL_NULL: u32 = u32::MAX;
