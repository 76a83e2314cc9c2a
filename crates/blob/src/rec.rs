//! The slice of the record layer this crate needs:
//! where a record lives, where its fields are, and which fields are
//! stored externally.

use core::ops::Range;

use offpage_primitives::PageId;

use crate::reference::{BlobRef, FIELD_REF_SIZE};

/// Location of a clustered index record.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct RecPos {
    /// The leaf page holding the record.
    pub page: PageId,
    /// The record's heap number within the page.
    pub heap_no: u16,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct FieldSlot {
    start: usize,
    len: usize,
    external: bool,
}

/// Offsets of the fields of one record, relative to the record start.
///
/// An externally stored field holds its local prefix followed by a
/// [`BlobRef`] in its last [`FIELD_REF_SIZE`] bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecOffsets {
    fields: Vec<FieldSlot>,
}

impl RecOffsets {
    /// Offsets of a record whose fields of length `lens` are stored back to back.
    pub fn from_lens(lens: impl IntoIterator<Item = usize>) -> Self {
        let mut start = 0;
        let fields = lens
            .into_iter()
            .map(|len| {
                let slot = FieldSlot {
                    start,
                    len,
                    external: false,
                };
                start += len;
                slot
            })
            .collect();
        Self { fields }
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// The total size of the record's field data.
    pub fn data_size(&self) -> usize {
        self.fields.last().map_or(0, |f| f.start + f.len)
    }

    /// The byte range of field `n` within the record.
    pub fn nth_field(&self, n: usize) -> Range<usize> {
        let f = &self.fields[n];
        f.start..f.start + f.len
    }

    pub fn is_nth_extern(&self, n: usize) -> bool {
        self.fields[n].external
    }

    /// Flags field `n` as externally stored.
    pub fn make_nth_extern(&mut self, n: usize) {
        self.fields[n].external = true;
    }

    pub fn any_extern(&self) -> bool {
        self.fields.iter().any(|f| f.external)
    }

    /// The field numbers of all externally stored fields.
    pub fn extern_fields(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.external)
            .map(|(i, _)| i)
    }

    /// The byte range of the reference of field `n`,
    /// or `None` if the field is too short to carry one.
    pub fn field_ref_range(&self, n: usize) -> Option<Range<usize>> {
        let Range { start, end } = self.nth_field(n);
        (end - start >= FIELD_REF_SIZE).then(|| end - FIELD_REF_SIZE..end)
    }

    /// The length of the locally stored prefix of external field `n`.
    pub fn local_len(&self, n: usize) -> usize {
        self.fields[n].len.saturating_sub(FIELD_REF_SIZE)
    }

    /// Decodes the reference of field `n` in `rec`.
    ///
    /// Panics if field `n` cannot carry a reference.
    pub fn field_ref(&self, rec: &[u8], n: usize) -> BlobRef {
        let range = self.ref_range_or_panic(n);
        BlobRef::from_bytes(&rec[range])
    }

    pub(crate) fn ref_range_or_panic(&self, n: usize) -> Range<usize> {
        self.field_ref_range(n)
            .unwrap_or_else(|| panic!("field {n} is too short to hold an external reference"))
    }
}

/// A field value to be moved off-page.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BigRecField {
    /// The field of the record whose reference will point at the chain.
    pub field_no: usize,
    /// The bytes to store off-page.
    pub data: Vec<u8>,
}

/// The fields of one record that need external storage.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BigRec {
    pub fields: Vec<BigRecField>,
}

impl BigRec {
    pub fn new(fields: Vec<BigRecField>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The fields touched by an update of a record.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct UpdateVector {
    field_nos: Vec<usize>,
}

impl UpdateVector {
    pub fn new(field_nos: impl IntoIterator<Item = usize>) -> Self {
        let mut field_nos: Vec<_> = field_nos.into_iter().collect();
        field_nos.sort_unstable();
        field_nos.dedup();
        Self { field_nos }
    }

    /// Does the update modify field `field_no`?
    pub fn contains(&self, field_no: usize) -> bool {
        self.field_nos.binary_search(&field_no).is_ok()
    }

    pub fn field_nos(&self) -> &[usize] {
        &self.field_nos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_contiguous() {
        let offsets = RecOffsets::from_lens([8, 100, 3]);
        assert_eq!(offsets.n_fields(), 3);
        assert_eq!(offsets.nth_field(0), 0..8);
        assert_eq!(offsets.nth_field(1), 8..108);
        assert_eq!(offsets.nth_field(2), 108..111);
        assert_eq!(offsets.data_size(), 111);
    }

    #[test]
    fn reference_sits_at_field_tail() {
        let offsets = RecOffsets::from_lens([8, 100, 3]);
        assert_eq!(offsets.field_ref_range(1), Some(88..108));
        assert_eq!(offsets.local_len(1), 80);
        assert_eq!(offsets.field_ref_range(2), None);
    }

    #[test]
    fn extern_flags() {
        let mut offsets = RecOffsets::from_lens([8, 40, 40]);
        assert!(!offsets.any_extern());
        offsets.make_nth_extern(2);
        assert!(offsets.any_extern());
        assert!(offsets.is_nth_extern(2));
        assert!(!offsets.is_nth_extern(1));
        assert_eq!(offsets.extern_fields().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn update_vector_lookup() {
        let upd = UpdateVector::new([4, 1, 4]);
        assert_eq!(upd.field_nos(), &[1, 4]);
        assert!(upd.contains(4));
        assert!(!upd.contains(2));
    }
}
