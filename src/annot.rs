//! Per-slot annotations carried alongside the k-mer index.
//!
//! The index itself packs only counts into its cells; everything else known
//! about a k-mer (library presence, allelic partner, contig placement and
//! neighbor links) lives here, in a side array indexed by slot.

use crate::partner::Subst;

/// Link to a neighboring k-mer slot within the same contig.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link {
    pub slot: usize,
    /// Offset distance (gap size plus k-mer length) to the neighbor.
    pub dist: u32,
    /// Neighbor is on the opposite strand sense.
    pub flip: bool,
    /// Distance known only from template evidence, not confirmed by reads.
    pub fuzzy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Annot {
    /// Bitmap of the sequence sets this k-mer was seen in.
    pub libs: u64,
    /// Partner sweep found no hit at all (confirmed nonpolymorphic) or
    /// exactly one hit; false once a second candidate partner shows up.
    pub unambiguous: bool,
    /// A single allelic partner was found; the three SNP fields below are
    /// undefined unless this is set.
    pub partnered: bool,
    /// 1-based offset of the SNP base from the left end of the k-mer.
    pub pos: u8,
    /// Base substitution linking this k-mer to its partner.
    pub xor_mask: Subst,
    /// Partner sits in the table reverse-complemented relative to this k-mer.
    pub flip: bool,
    /// Scratch bit for read processing: seen in the forward mate of the
    /// current read pair.
    pub in_fwd: bool,
    /// Containing contig id; 0 means not placed in any contig.
    pub contig: u32,
    /// 1-based start position within the containing contig.
    pub contig_pos: u32,
    /// Opposite strand sense from the contig.
    pub contig_flip: bool,
    /// Neighboring k-mers in this contig, relative to this k-mer's own
    /// orientation rather than the contig's head/tail.
    pub up: Option<Link>,
    pub down: Option<Link>,
}

/// Side array of annotations, one per index slot.
pub struct AnnotStore {
    side: Vec<Annot>,
}

impl AnnotStore {
    pub fn new(size: usize) -> Self {
        Self {
            side: vec![Annot::default(); size],
        }
    }
}

impl std::ops::Index<usize> for AnnotStore {
    type Output = Annot;

    #[inline]
    fn index(&self, slot: usize) -> &Annot {
        &self.side[slot]
    }
}

impl std::ops::IndexMut<usize> for AnnotStore {
    #[inline]
    fn index_mut(&mut self, slot: usize) -> &mut Annot {
        &mut self.side[slot]
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn default_annot_is_inert() {
        let store = AnnotStore::new(8);
        let a = &store[3];
        assert_eq!(a.libs, 0);
        assert!(!a.partnered && !a.unambiguous);
        assert_eq!(a.xor_mask, Subst::None);
        assert_eq!(a.contig, 0);
        assert!(a.up.is_none() && a.down.is_none());
    }
}
