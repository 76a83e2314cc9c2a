/// The page size of a tablespace.
///
/// A tablespace is compressed iff its physical (on-disk) page size is smaller
/// than its logical (in-memory frame) page size.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct PageSize {
    physical: u32,
    logical: u32,
}

impl PageSize {
    /// The smallest supported page size (of either kind).
    pub const MIN: u32 = 1024;
    /// The largest supported page size (of either kind).
    pub const MAX: u32 = 64 * 1024;
    /// The default logical page size.
    pub const DEFAULT: Self = Self::uncompressed(16 * 1024);

    /// Page size of a compressed tablespace with `physical` byte images
    /// backing `logical` byte frames.
    ///
    /// Panics if either size is not a power of two in `MIN..=MAX`,
    /// or if `physical > logical`.
    pub const fn new(physical: u32, logical: u32) -> Self {
        assert!(physical.is_power_of_two() && physical >= Self::MIN && physical <= Self::MAX);
        assert!(logical.is_power_of_two() && logical >= Self::MIN && logical <= Self::MAX);
        assert!(physical <= logical);
        Self { physical, logical }
    }

    /// Page size of an uncompressed tablespace.
    pub const fn uncompressed(size: u32) -> Self {
        Self::new(size, size)
    }

    /// The size of a page image on disk.
    #[inline]
    pub const fn physical(self) -> usize {
        self.physical as usize
    }

    /// The size of a page frame in the buffer pool.
    #[inline]
    pub const fn logical(self) -> usize {
        self.logical as usize
    }

    #[inline]
    pub const fn is_compressed(self) -> bool {
        self.physical < self.logical
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}
