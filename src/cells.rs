//! Packed cell layout: up to three unsigned info fields stored in the high
//! bits of a u64 left unused by the k-mer value.
//!
//! Layout within 64 bits (MSB down):
//! `[ info1 ][ info2 ][ info3 ][ k-mer ]`
//! where info3 ends where the unused-bit budget ends. Field widths are fixed
//! at construction; info1 takes whatever the other two fields leave of the
//! budget. Stores saturate at each field's maximum so an overflowing counter
//! can never spill into the k-mer bits.

use crate::kmers::{Kmer, KmerCoder, KMER_BITS};

#[derive(Debug, Copy, Clone)]
struct Field {
    len: usize,
    shift: usize,
    mask: Kmer,
}

impl Field {
    fn new(len: usize, shift: usize) -> Self {
        if len == 0 {
            // zero-width field: reads as 0, stores are no-ops, and the shift
            // must stay in range for a 64-bit word
            return Self {
                len,
                shift: 0,
                mask: 0,
            };
        }
        Self {
            len,
            shift,
            mask: !0 >> (KMER_BITS - len),
        }
    }

    #[inline]
    fn get(&self, w: Kmer) -> u64 {
        (w >> self.shift) & self.mask
    }

    #[inline]
    fn put(&self, w: Kmer, v: u64) -> Kmer {
        (w & !(self.mask << self.shift)) | (v.min(self.mask) << self.shift)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct CellLayout {
    coder: KmerCoder,
    info: [Field; 3],
}

impl CellLayout {
    /// Fails if the requested info2/info3 widths exceed the bits left unused
    /// by a k-mer of this length (a configuration error).
    pub fn new(length: usize, info2_len: usize, info3_len: usize) -> anyhow::Result<Self> {
        let coder = KmerCoder::new(length)?;
        let unused = coder.bits_unused();
        if info2_len + info3_len > unused {
            return Err(anyhow!(
                "info field widths {info2_len}+{info3_len} exceed the {unused} bits \
                 unused by a {length}-base k-mer"
            ));
        }
        let info1_len = unused - info2_len - info3_len;
        let info = [
            Field::new(info1_len, KMER_BITS - info1_len),
            Field::new(info2_len, KMER_BITS - info1_len - info2_len),
            Field::new(info3_len, KMER_BITS - unused),
        ];
        Ok(Self { coder, info })
    }

    #[inline]
    pub fn coder(&self) -> &KmerCoder {
        &self.coder
    }

    #[inline]
    pub fn info1_len(&self) -> usize {
        self.info[0].len
    }

    #[inline]
    pub fn info1_max(&self) -> u64 {
        self.info[0].mask
    }

    #[inline]
    pub fn get_info1(&self, w: Kmer) -> u64 {
        self.info[0].get(w)
    }

    #[inline]
    pub fn put_info1(&self, w: Kmer, v: u64) -> Kmer {
        self.info[0].put(w, v)
    }

    #[inline]
    pub fn get_info2(&self, w: Kmer) -> u64 {
        self.info[1].get(w)
    }

    #[inline]
    pub fn put_info2(&self, w: Kmer, v: u64) -> Kmer {
        self.info[1].put(w, v)
    }

    #[inline]
    pub fn get_info3(&self, w: Kmer) -> u64 {
        self.info[2].get(w)
    }

    #[inline]
    pub fn put_info3(&self, w: Kmer, v: u64) -> Kmer {
        self.info[2].put(w, v)
    }

    /// Saturating add to all three fields at once.
    #[inline]
    pub fn increment(&self, w: Kmer, inc1: u64, inc2: u64, inc3: u64) -> Kmer {
        let w = self.put_info1(w, self.get_info1(w).saturating_add(inc1));
        let w = self.put_info2(w, self.get_info2(w).saturating_add(inc2));
        self.put_info3(w, self.get_info3(w).saturating_add(inc3))
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn field_isolation() {
        // 23-base k-mer leaves 18 unused bits: info1 gets 10, info2 5, info3 3
        let cl = CellLayout::new(23, 5, 3).unwrap();
        let kmer = 0x3f_ffff_ffff_ffff & cl.coder().val_mask();
        let mut w = cl.coder().put_kmer(0, kmer);
        w = cl.put_info1(w, 7);
        w = cl.put_info2(w, 3);
        w = cl.put_info3(w, 5);
        assert_eq!(cl.coder().get_kmer(w), kmer);
        assert_eq!(cl.get_info1(w), 7);
        assert_eq!(cl.get_info2(w), 3);
        assert_eq!(cl.get_info3(w), 5);
        // mutating one field leaves the others alone
        let w2 = cl.increment(w, 0, 1, 0);
        assert_eq!(cl.get_info1(w2), 7);
        assert_eq!(cl.get_info2(w2), 4);
        assert_eq!(cl.get_info3(w2), 5);
        assert_eq!(cl.coder().get_kmer(w2), kmer);
    }

    #[test]
    fn increments_saturate() {
        let cl = CellLayout::new(23, 5, 3).unwrap();
        let mut w = 0;
        for _ in 0..100 {
            w = cl.increment(w, 0, 3, 1);
        }
        assert_eq!(cl.get_info2(w), 31);
        assert_eq!(cl.get_info3(w), 7);
        // the k-mer bits stayed zero throughout
        assert_eq!(cl.coder().get_kmer(w), 0);
        // one huge increment also clamps
        let w = cl.increment(0, u64::MAX, 0, 0);
        assert_eq!(cl.get_info1(w), cl.info1_max());
    }

    #[test]
    fn rejects_oversized_fields() {
        // 30 bases leave 4 unused bits
        assert!(CellLayout::new(30, 3, 2).is_err());
        assert!(CellLayout::new(30, 2, 2).is_ok());
    }

    #[test]
    fn zero_width_fields_read_zero() {
        let cl = CellLayout::new(23, 0, 0).unwrap();
        let w = cl.increment(0, 1, 5, 5);
        assert_eq!(cl.get_info1(w), 1);
        assert_eq!(cl.get_info2(w), 0);
        assert_eq!(cl.get_info3(w), 0);
    }
}
