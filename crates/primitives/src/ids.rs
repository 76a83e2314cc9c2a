//! Provides identifiers such as `SpaceId` and `PageNo`.
use core::fmt;

/// A tablespace identifier.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct SpaceId(pub u32);

/// A page number within a tablespace.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct PageNo(pub u32);

/// An index identifier.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct IndexId(pub u64);

impl PageNo {
    /// The "no page" sentinel, used to terminate page chains.
    pub const NULL: Self = Self(crate::FIL_NULL);

    /// Is this the `FIL_NULL` sentinel?
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == crate::FIL_NULL
    }

    /// The page directly following `self`,
    /// used as an allocation hint when growing a chain.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

macro_rules! system_id {
    ($name:ident, $repr:ty) => {
        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }
        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
system_id!(SpaceId, u32);
system_id!(PageNo, u32);
system_id!(IndexId, u64);

/// The address of a page: a tablespace and a page number within it.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PageId {
    pub space: SpaceId,
    pub page_no: PageNo,
}

impl PageId {
    #[inline]
    pub const fn new(space: SpaceId, page_no: PageNo) -> Self {
        Self { space, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[page id: space={}, page number={}]", self.space, self.page_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_page_is_the_sentinel() {
        assert!(PageNo::NULL.is_null());
        assert!(!PageNo(0).is_null());
        assert_eq!(PageNo::NULL.0, u32::MAX);
    }

    #[test]
    fn page_id_display_names_space_and_page() {
        let id = PageId::new(SpaceId(7), PageNo(42));
        assert_eq!(id.to_string(), "[page id: space=7, page number=42]");
    }
}
