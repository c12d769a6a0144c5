//! K-mer codec and rolling window generator.
//!
//! K-mers of up to 32 bases are held in a single u64 at 2 bits per base,
//! using A=0, C=1, G=2, T=3 so that integer order on encoded k-mers matches
//! lexicographic order on the base strings. The high bits left unused by a
//! k-mer shorter than 32 bases are available for packed info fields (see
//! [`crate::cells`]).

pub type Kmer = u64;

pub const BASE_BITS: usize = 2;
pub const BASE_MASK: Kmer = (1 << BASE_BITS) - 1;
pub const KMER_BITS: usize = Kmer::BITS as usize;
pub const MAX_BASES: usize = KMER_BITS / BASE_BITS;

// An ASCII A, C, G or T masked with 0x6 gives bit offsets 0, 2, 6 and 4;
// the 2-bit fields of 0xb4 (10 11 01 00) at those offsets hold the codes.
const BASE_CODING: Kmer = 0xb4;
const BASE_CHARS: &[u8; 4] = b"ACGT";

/// 2-bit code for an ASCII base character (case-insensitive). Characters
/// outside ACGT map to an arbitrary code; validity filtering is the
/// reader/generator's job.
#[inline]
pub fn encode_base(c: u8) -> Kmer {
    (BASE_CODING >> (c as Kmer & 0x6)) & BASE_MASK
}

/// Fixed-length k-mer context: carries `length` and fires off the operations
/// that need to know it. Stateless otherwise.
#[derive(Debug, Copy, Clone)]
pub struct KmerCoder {
    length: usize,
    bits_unused: usize,
    val_mask: Kmer,
}

impl KmerCoder {
    pub fn new(length: usize) -> anyhow::Result<Self> {
        if length == 0 || length > MAX_BASES {
            return Err(anyhow!(
                "illegal k-mer length {length}: must be in 1..={MAX_BASES}"
            ));
        }
        let bits_unused = KMER_BITS - BASE_BITS * length;
        Ok(Self {
            length,
            bits_unused,
            val_mask: !0 >> bits_unused,
        })
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn bits_unused(&self) -> usize {
        self.bits_unused
    }

    #[inline]
    pub fn val_mask(&self) -> Kmer {
        self.val_mask
    }

    /// Number of hex digits used when printing a k-mer of this length.
    #[inline]
    pub fn hex_width(&self) -> usize {
        (self.length + 1) / 2
    }

    /// Isolate the k-mer value from a (possibly packed) cell.
    #[inline]
    pub fn get_kmer(&self, w: Kmer) -> Kmer {
        w & self.val_mask
    }

    /// Replace the k-mer bits of `w`, leaving any packed info bits untouched.
    #[inline]
    pub fn put_kmer(&self, w: Kmer, kmer: Kmer) -> Kmer {
        (w & !self.val_mask) | (kmer & self.val_mask)
    }

    /// Reverse complement. Must be called on a bare k-mer value; a set bit
    /// above the k-mer range means a packed cell was passed by mistake.
    pub fn rev_comp(&self, w: Kmer) -> Kmer {
        assert_eq!(
            w & !self.val_mask,
            0,
            "rev_comp called on a packed cell, not a bare k-mer: {w:#x}"
        );
        let mut w = w;
        let mut r = 0;
        for _ in 0..self.length {
            r = (r << BASE_BITS) | (!w & BASE_MASK);
            w >>= BASE_BITS;
        }
        r
    }

    /// Canonical form: the smaller of a k-mer and its reverse complement.
    #[inline]
    pub fn canonical(&self, w: Kmer) -> Kmer {
        let r = self.rev_comp(w);
        w.min(r)
    }

    /// Flip the base `shift` positions from the right end with an XOR mask
    /// (see [`crate::partner::Subst`]).
    #[inline]
    pub fn mutate(&self, w: Kmer, mask: Kmer, shift: usize) -> Kmer {
        w ^ (mask << (BASE_BITS * shift))
    }

    pub fn to_bases(&self, w: Kmer) -> String {
        let mut w = self.get_kmer(w);
        let mut s = vec![0u8; self.length];
        for c in s.iter_mut().rev() {
            *c = BASE_CHARS[(w & BASE_MASK) as usize];
            w >>= BASE_BITS;
        }
        String::from_utf8(s).expect("base characters are ASCII")
    }

    pub fn from_bases(&self, s: &str) -> anyhow::Result<Kmer> {
        if s.len() != self.length {
            return Err(anyhow!(
                "base string '{s}' has length {}, expected {}",
                s.len(),
                self.length
            ));
        }
        let mut w = 0;
        for c in s.bytes() {
            if !matches!(c.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T') {
                return Err(anyhow!("illegal base character in '{s}'"));
            }
            w = (w << BASE_BITS) | encode_base(c);
        }
        Ok(w)
    }
}

/// Builds k-mers from an advancing base stream, keeping forward and
/// reverse-complement accumulators in parallel. The current window is valid
/// once `length` consecutive valid bases have been seen since the last
/// `clear`.
pub struct KmerGen {
    coder: KmerCoder,
    f: Kmer,
    r: Kmer,
    ngood: usize,
}

impl KmerGen {
    pub fn new(coder: KmerCoder) -> Self {
        Self {
            coder,
            f: 0,
            r: 0,
            ngood: 0,
        }
    }

    #[inline]
    pub fn coder(&self) -> &KmerCoder {
        &self.coder
    }

    /// Reset on an ambiguous base or a sequence boundary.
    pub fn clear(&mut self) {
        self.f = 0;
        self.r = 0;
        self.ngood = 0;
    }

    /// Shift in one valid base code; returns true once the window is full.
    #[inline]
    pub fn advance(&mut self, code: Kmer) -> bool {
        let mask = self.coder.val_mask;
        let k = self.coder.length;
        self.f = ((self.f << BASE_BITS) | (code & BASE_MASK)) & mask;
        self.r = ((self.r >> BASE_BITS) | ((!code & BASE_MASK) << (BASE_BITS * (k - 1)))) & mask;
        self.ngood += 1;
        self.ngood >= k
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.ngood >= self.coder.length
    }

    /// Canonical form of the current window. Only meaningful when
    /// [`is_full`](Self::is_full) holds.
    #[inline]
    pub fn current(&self) -> Kmer {
        self.f.min(self.r)
    }

    #[inline]
    pub fn fwd(&self) -> Kmer {
        self.f
    }

    #[inline]
    pub fn rev(&self) -> Kmer {
        self.r
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn encoding_is_lexicographic() {
        let c = KmerCoder::new(4).unwrap();
        let mut strings = vec![
            "AAAA", "AAAT", "ACGT", "CCCC", "CGAT", "GGTA", "TTTA", "TTTT",
        ];
        strings.sort_unstable();
        let codes: Vec<_> = strings.iter().map(|s| c.from_bases(s).unwrap()).collect();
        for w in codes.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn round_trip() {
        let c = KmerCoder::new(7).unwrap();
        for s in ["ACGTACG", "TTTTTTT", "GATTACA"] {
            let w = c.from_bases(s).unwrap();
            assert_eq!(c.to_bases(w), s);
            assert_eq!(c.from_bases(&c.to_bases(w)).unwrap(), w);
        }
    }

    #[test]
    fn canonical_idempotent() {
        let c = KmerCoder::new(5).unwrap();
        for w in 0..(1u64 << 10) {
            let n = c.canonical(w);
            assert_eq!(c.canonical(n), n);
            assert_eq!(c.canonical(c.rev_comp(w)), n);
        }
    }

    #[test]
    fn rev_comp_pairs_bases() {
        let c = KmerCoder::new(4).unwrap();
        let w = c.from_bases("ACGT").unwrap();
        // ACGT is its own reverse complement
        assert_eq!(c.rev_comp(w), w);
        let w = c.from_bases("AAAA").unwrap();
        assert_eq!(c.to_bases(c.rev_comp(w)), "TTTT");
        let w = c.from_bases("ACCA").unwrap();
        assert_eq!(c.to_bases(c.rev_comp(w)), "TGGT");
    }

    #[test]
    #[should_panic]
    fn rev_comp_rejects_packed_cells() {
        let c = KmerCoder::new(4).unwrap();
        let _ = c.rev_comp(1 << 60);
    }

    #[test]
    fn rolling_window_matches_direct_encoding() {
        let c = KmerCoder::new(4).unwrap();
        let mut gen = KmerGen::new(c);
        let seq = b"ACGTTGCA";
        for (i, &b) in seq.iter().enumerate() {
            let full = gen.advance(encode_base(b));
            assert_eq!(full, i + 1 >= 4);
            if full {
                let s = std::str::from_utf8(&seq[i + 1 - 4..=i]).unwrap();
                let w = c.from_bases(s).unwrap();
                assert_eq!(gen.fwd(), w);
                assert_eq!(gen.rev(), c.rev_comp(w));
                assert_eq!(gen.current(), c.canonical(w));
            }
        }
        gen.clear();
        assert!(!gen.is_full());
    }

    #[test]
    fn mutate_flips_one_base() {
        let c = KmerCoder::new(4).unwrap();
        let w = c.from_bases("AAAA").unwrap();
        // complement mask (3) at the last base: AAAA -> AAAT
        assert_eq!(c.to_bases(c.mutate(w, 3, 0)), "AAAT");
        // transition mask (2) at the first base: AAAA -> GAAA
        assert_eq!(c.to_bases(c.mutate(w, 2, 3)), "GAAA");
    }
}
