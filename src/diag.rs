//! Diagonal clustering of read k-mer hits against contigs.
//!
//! Hits from one read (or read pair) that fall on the same alignment
//! diagonal of the same contig belong to one consistent placement. Same
//! strand hits share `contig_pos - read_pos`; opposite strand hits share
//! `contig_pos + read_pos` (the antidiagonal). The subtraction is ordered so
//! the diagonal is more often positive.

/// One alignment diagonal accumulated over a read pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Diagonal {
    pub contig: u32,
    pub diag: i64,
    /// Hit strands opposite between read and contig.
    pub anti: bool,
    /// Hit came from the reverse mate of the pair.
    pub revmate: bool,
    /// Leftmost and rightmost read positions seen on this diagonal.
    pub rpos_l: u32,
    pub rpos_r: u32,
    pub n_kmers: u32,
}

/// Read-position spans per mate, over all diagonals of the current read
/// pair. `max_fwd == 0` means no forward-mate hits at all (positions are
/// 1-based), likewise for `max_rev`.
#[derive(Debug, Copy, Clone, Default)]
pub struct MateSpans {
    pub min_fwd: u32,
    pub max_fwd: u32,
    pub min_rev: u32,
    pub max_rev: u32,
}

/// Diagonal accumulator, cleared between read pairs. The number of live
/// diagonals per read is small, so a linear scan beats anything fancier.
#[derive(Default)]
pub struct DiagClusters {
    dvec: Vec<Diagonal>,
}

impl DiagClusters {
    pub fn new() -> Self {
        Self {
            dvec: Vec::with_capacity(200),
        }
    }

    /// Record a k-mer hit of the current read against its containing contig.
    /// Unplaced k-mers (contig 0) are ignored.
    pub fn add_hit(
        &mut self,
        contig: u32,
        contig_pos: u32,
        contig_flip: bool,
        rpos: u32,
        rflip: bool,
        revmate: bool,
    ) {
        if contig == 0 {
            return;
        }
        let anti = rflip ^ contig_flip;
        let diag = if anti {
            contig_pos as i64 + rpos as i64
        } else {
            contig_pos as i64 - rpos as i64
        };
        for d in self.dvec.iter_mut() {
            if d.contig == contig && d.diag == diag && d.anti == anti && d.revmate == revmate {
                d.n_kmers += 1;
                d.rpos_r = rpos;
                return;
            }
        }
        self.dvec.push(Diagonal {
            contig,
            diag,
            anti,
            revmate,
            rpos_l: rpos,
            rpos_r: rpos,
            n_kmers: 1,
        });
    }

    pub fn clear(&mut self) {
        self.dvec.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dvec.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagonal> {
        self.dvec.iter()
    }

    /// Read-position spans for each mate across all diagonals.
    pub fn spans(&self) -> MateSpans {
        let mut s = MateSpans {
            min_fwd: u32::MAX,
            max_fwd: 0,
            min_rev: u32::MAX,
            max_rev: 0,
        };
        for d in &self.dvec {
            if d.revmate {
                s.min_rev = s.min_rev.min(d.rpos_l);
                s.max_rev = s.max_rev.max(d.rpos_r);
            } else {
                s.min_fwd = s.min_fwd.min(d.rpos_l);
                s.max_fwd = s.max_fwd.max(d.rpos_r);
            }
        }
        s
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn consistent_hits_share_a_diagonal() {
        let mut dc = DiagClusters::new();
        // contig positions and read positions advancing in step
        dc.add_hit(3, 100, false, 10, false, false);
        dc.add_hit(3, 105, false, 15, false, false);
        dc.add_hit(3, 112, false, 22, false, false);
        let ds: Vec<_> = dc.iter().copied().collect();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].diag, 90);
        assert!(!ds[0].anti);
        assert_eq!((ds[0].rpos_l, ds[0].rpos_r), (10, 22));
        assert_eq!(ds[0].n_kmers, 3);
    }

    #[test]
    fn strand_and_mate_split_diagonals() {
        let mut dc = DiagClusters::new();
        dc.add_hit(3, 100, false, 10, false, false);
        // opposite strand sense: antidiagonal, separate cluster
        dc.add_hit(3, 100, true, 10, false, false);
        // reverse mate on the same antidiagonal: separate again
        dc.add_hit(3, 100, true, 10, false, true);
        // different contig
        dc.add_hit(4, 100, false, 10, false, false);
        // unplaced kmer ignored
        dc.add_hit(0, 100, false, 10, false, false);
        assert_eq!(dc.iter().count(), 4);
        let s = dc.spans();
        assert_eq!((s.min_fwd, s.max_fwd), (10, 10));
        assert_eq!((s.min_rev, s.max_rev), (10, 10));
        dc.clear();
        assert!(dc.is_empty());
        assert_eq!(dc.spans().max_fwd, 0);
    }
}
