//! Fixed-capacity open-addressing index of packed k-mer cells.
//!
//! Keys are canonical k-mer values; the cell layout packs counts into the
//! unused high bits. Collisions are resolved by stepping with a small prime
//! chosen per key: because `Size` is prime and every step is non-zero mod
//! `Size`, the probe sequence reaches every slot before returning to its
//! start. The table never resizes; running it full is fatal for the caller.
//!
//! Optional slicing restricts an instance to keys with
//! `key mod slicing == slice`, so an astronomically large k-mer space can be
//! sharded into independently processable partitions.

use crate::cells::CellLayout;
use crate::kmers::Kmer;

/// Outcome of a slot lookup. `Found`/`Missing` carry the slot index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(usize),
    Missing(usize),
    Sliced,
    Full,
}

const STEP_PRIMES: [u64; 13] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41];

pub struct KmerIndex {
    layout: CellLayout,
    cells: Vec<Kmer>,
    slicing: u64,
    slice: u64,
    hash_pct: u64,
    primes: [u64; STEP_PRIMES.len()],
    nstep: u64,
    insertions: u64,
    distinct: u64,
}

impl KmerIndex {
    /// `size` must be prime (callers reduce a requested capacity with
    /// [`crate::utils::get_prime`]) and over 1000. Slicing of 3 interacts
    /// badly with 2-bit-per-base values (powers of 4 mod 3; see Knuth) and is
    /// rejected.
    pub fn new(
        size: usize,
        slicing: u64,
        slice: u64,
        length: usize,
        info2_len: usize,
        info3_len: usize,
    ) -> anyhow::Result<Self> {
        let layout = CellLayout::new(length, info2_len, info3_len)?;
        if layout.info1_len() == 0 {
            return Err(anyhow!(
                "no unused bits left for the count field with length {length} \
                 and info widths {info2_len}+{info3_len}"
            ));
        }
        if size <= 1000 {
            return Err(anyhow!("index size {size} too small: must be > 1000"));
        }
        if slicing == 3 {
            return Err(anyhow!("slicing factor 3 is degenerate for 2-bit base codes"));
        }
        if slicing <= slice {
            return Err(anyhow!(
                "slicing factor {slicing} must be greater than slice {slice}"
            ));
        }
        let nstep = if slicing == STEP_PRIMES.len() as u64 {
            STEP_PRIMES.len() as u64 - 2
        } else {
            STEP_PRIMES.len() as u64
        };
        let mut primes = STEP_PRIMES;
        for p in primes.iter_mut() {
            if *p == nstep {
                *p = 43;
            } else if *p == slicing {
                *p = 47;
            }
        }
        Ok(Self {
            layout,
            cells: vec![0; size],
            slicing,
            slice,
            hash_pct: (size / 100) as u64,
            primes,
            nstep,
            insertions: 0,
            distinct: 0,
        })
    }

    #[inline]
    pub fn layout(&self) -> &CellLayout {
        &self.layout
    }

    #[inline]
    pub fn coder(&self) -> &crate::kmers::KmerCoder {
        self.layout.coder()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn slicing(&self) -> u64 {
        self.slicing
    }

    #[inline]
    pub fn slice(&self) -> u64 {
        self.slice
    }

    #[inline]
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    #[inline]
    pub fn distinct(&self) -> u64 {
        self.distinct
    }

    /// Raw cell at a slot previously returned by `lookup_loc`/`insert`.
    #[inline]
    pub fn cell(&self, slot: usize) -> Kmer {
        self.cells[slot]
    }

    #[inline]
    fn in_slice(&self, w: Kmer) -> bool {
        w % self.slicing == self.slice
    }

    /// Locate the slot for a key (canonicalized first). `Sliced` is returned
    /// before any table access; `Full` means the probe cycle returned to its
    /// start without finding the key or an empty slot.
    pub fn lookup_loc(&self, key: Kmer) -> Probe {
        let coder = self.layout.coder();
        let key = coder.canonical(coder.get_kmer(key));
        if !self.in_slice(key) {
            return Probe::Sliced;
        }
        let size = self.cells.len();
        let start = (key % size as u64) as usize;
        let mut probe = start;
        let mut cell = self.cells[probe];
        if cell != 0 && coder.get_kmer(cell) != key {
            let step = self.primes[(key % self.nstep) as usize] as usize;
            loop {
                probe += step;
                if probe >= size {
                    probe -= size;
                }
                if probe == start {
                    break;
                }
                cell = self.cells[probe];
                if cell == 0 || coder.get_kmer(cell) == key {
                    break;
                }
            }
        }
        if cell == 0 {
            Probe::Missing(probe)
        } else if coder.get_kmer(cell) != key {
            Probe::Full
        } else {
            Probe::Found(probe)
        }
    }

    /// Insert or update a key with saturating field increments. First arrival
    /// wins the located empty slot and always records at least one count, so
    /// an occupied cell is never all-zero. A full table is unrecoverable
    /// mid-stream and surfaces as an error for the driver.
    pub fn insert(&mut self, key: Kmer, inc1: u64, inc2: u64, inc3: u64) -> anyhow::Result<Probe> {
        let coder = self.layout.coder();
        let key = coder.canonical(coder.get_kmer(key));
        match self.lookup_loc(key) {
            Probe::Sliced => Ok(Probe::Sliced),
            Probe::Full => Err(anyhow!(
                "index full on k-mer {} ({:x}): insertions {}, distinct {}, size {}",
                coder.to_bases(key),
                key,
                self.insertions,
                self.distinct,
                self.cells.len()
            )),
            Probe::Missing(loc) => {
                self.insertions += 1;
                self.distinct += 1;
                if self.hash_pct > 0 && self.distinct % self.hash_pct == 0 {
                    info!("k-mer index is {}% full", self.distinct / self.hash_pct);
                }
                self.cells[loc] = self.layout.increment(key, inc1.max(1), inc2, inc3);
                Ok(Probe::Missing(loc))
            }
            Probe::Found(loc) => {
                self.insertions += 1;
                self.cells[loc] = self.layout.increment(self.cells[loc], inc1, inc2, inc3);
                Ok(Probe::Found(loc))
            }
        }
    }

    /// Table-loading insert: the key must not already be present. Returns
    /// the new slot.
    pub fn insert_new(&mut self, key: Kmer, count: u64) -> anyhow::Result<usize> {
        match self.insert(key, count, 0, 0)? {
            Probe::Missing(loc) => Ok(loc),
            p => Err(anyhow!(
                "duplicate k-mer {:x} while loading table ({p:?})",
                key
            )),
        }
    }

    /// Occupied slots in table-address order (no k-mer value ordering).
    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, Kmer)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0)
            .map(|(i, &c)| (i, c))
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn probe_sequence_reaches_every_slot() {
        // prime table size: any non-zero step visits all slots before
        // returning to the start
        let size = 1009usize;
        for step in [2usize, 5, 13, 43, 47] {
            let start = 123usize;
            let mut probe = start;
            let mut seen = vec![false; size];
            let mut visits = 0;
            loop {
                probe += step;
                if probe >= size {
                    probe -= size;
                }
                assert!(!seen[probe], "slot {probe} revisited at step {step}");
                seen[probe] = true;
                visits += 1;
                if probe == start {
                    break;
                }
            }
            assert_eq!(visits, size);
        }
    }

    #[test]
    fn insert_then_lookup_finds_same_slot() {
        let mut idx = KmerIndex::new(1009, 1, 0, 4, 0, 0).unwrap();
        let w = idx.coder().from_bases("ACGT").unwrap();
        let slot = match idx.insert(w, 1, 0, 0).unwrap() {
            Probe::Missing(s) => s,
            p => panic!("expected Missing, got {p:?}"),
        };
        assert_eq!(idx.lookup_loc(w), Probe::Found(slot));
        // second insert accumulates in place
        assert_eq!(idx.insert(w, 1, 0, 0).unwrap(), Probe::Found(slot));
        assert_eq!(idx.layout().get_info1(idx.cell(slot)), 2);
        let occupied: Vec<_> = idx.iter_occupied().collect();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].0, slot);
        assert_eq!(idx.distinct(), 1);
        assert_eq!(idx.insertions(), 2);
    }

    #[test]
    fn lookup_canonicalizes_keys() {
        let mut idx = KmerIndex::new(1009, 1, 0, 4, 0, 0).unwrap();
        let c = *idx.coder();
        let w = c.from_bases("AACC").unwrap();
        idx.insert(w, 1, 0, 0).unwrap();
        // the reverse complement resolves to the same slot
        match (idx.lookup_loc(w), idx.lookup_loc(c.rev_comp(w))) {
            (Probe::Found(a), Probe::Found(b)) => assert_eq!(a, b),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sliced_keys_never_touch_the_table() {
        let mut idx = KmerIndex::new(1009, 11, 5, 4, 0, 0).unwrap();
        let c = *idx.coder();
        for w in 0..256u64 {
            let key = c.canonical(w);
            let expect_sliced = key % 11 != 5;
            assert_eq!(idx.lookup_loc(key) == Probe::Sliced, expect_sliced);
            let r = idx.insert(key, 1, 0, 0).unwrap();
            assert_eq!(r == Probe::Sliced, expect_sliced);
        }
        for (_, cell) in idx.iter_occupied() {
            assert_eq!(c.get_kmer(cell) % 11, 5);
        }
    }

    #[test]
    fn filling_the_table_is_an_error() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut idx = KmerIndex::new(1009, 1, 0, 23, 0, 0).unwrap();
        let c = *idx.coder();
        let mut rng = StdRng::seed_from_u64(17);
        let mut full = false;
        for _ in 0..40_000 {
            let w = c.canonical(rng.gen::<u64>() & c.val_mask());
            if idx.insert(w, 1, 0, 0).is_err() {
                full = true;
                break;
            }
        }
        assert!(full, "table of 1009 never filled");
        assert_eq!(idx.distinct(), 1009);
    }

    #[test]
    fn rejects_bad_configurations() {
        assert!(KmerIndex::new(999, 1, 0, 23, 0, 0).is_err());
        assert!(KmerIndex::new(1009, 3, 0, 23, 0, 0).is_err());
        assert!(KmerIndex::new(1009, 5, 5, 23, 0, 0).is_err());
        // a 32-base k-mer leaves no room for a count field
        assert!(KmerIndex::new(1009, 1, 0, 32, 0, 0).is_err());
    }
}
