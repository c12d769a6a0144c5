use std::io::BufRead;

use crate::annot::AnnotStore;
use crate::cli::{Config, Task};
use crate::index::KmerIndex;
use crate::records::{parse_table_line, KmerRecord};

pub mod count;
pub mod edges;
pub mod link;
pub mod pair;
pub mod scan;

pub fn run(cfg: &Config) -> anyhow::Result<()> {
    match cfg.task() {
        Task::Count(opts) => count::run(cfg, opts),
        Task::Pair(opts) => pair::run(opts),
        Task::Edges(opts) => edges::run(opts),
        Task::Scan(opts) => scan::run(opts),
        Task::Link(opts) => link::run(opts),
    }
}

/// Sequence-set id for each input file: a `/` token advances to the next
/// set. Sets are numbered from 1.
pub(crate) fn seq_sets(files: &[String]) -> Vec<(u32, &str)> {
    let mut out = Vec::new();
    let mut set = 1;
    for f in files {
        if f == "/" {
            set += 1;
        } else {
            out.push((set, f.as_str()));
        }
    }
    out
}

/// Filters applied while loading a tagged k-mer table.
pub(crate) struct TableFilters<'a> {
    /// Accepted SNP positions for pair records.
    pub positions: &'a [bool],
    /// Load `x`/`p` records too.
    pub ambiguous: bool,
    /// Count bounds; pair records compare the count sum against the maximum.
    pub min_count: u64,
    pub max_count: u64,
    /// Slice filter for single-k-mer records. Pairs are loaded from every
    /// slice: a SNPmer table must hold both alleles no matter which slice
    /// produced it.
    pub slicing: u64,
    pub slice: u64,
}

/// Load a tagged table into an unsliced index plus its annotation store.
/// Both k-mers of a pair record are installed, the second with its SNP
/// position re-counted from its own left end when the pair is flipped.
pub(crate) fn load_table<R: BufRead>(
    rdr: R,
    idx: &mut KmerIndex,
    store: &mut AnnotStore,
    f: &TableFilters,
) -> anyhow::Result<()> {
    let k = idx.coder().length() as u8;
    for line in rdr.lines() {
        let line = line?;
        let rec = match parse_table_line(&line)? {
            Some(r) => r,
            None => continue,
        };
        match rec {
            KmerRecord::Paired(p) => {
                if !f.positions.get(p.pos as usize).copied().unwrap_or(false) {
                    continue;
                }
                if p.count1 < f.min_count
                    || p.count2 < f.min_count
                    || p.count1.saturating_add(p.count2) > f.max_count
                {
                    continue;
                }
                let i1 = idx.insert_new(p.kmer1, p.count1)?;
                let a = &mut store[i1];
                a.libs = p.bits1;
                a.unambiguous = true;
                a.partnered = true;
                a.pos = p.pos;
                a.xor_mask = p.xor_mask;
                a.flip = p.flip;
                let i2 = idx.insert_new(p.kmer2, p.count2)?;
                let a = &mut store[i2];
                a.libs = p.bits2;
                a.unambiguous = true;
                a.partnered = true;
                a.pos = if p.flip { k + 1 - p.pos } else { p.pos };
                a.xor_mask = p.xor_mask;
                a.flip = p.flip;
            }
            KmerRecord::Unpaired(s) => {
                if s.kmer % f.slicing != f.slice {
                    continue;
                }
                if s.count < f.min_count || s.count > f.max_count {
                    continue;
                }
                let i = idx.insert_new(s.kmer, s.count)?;
                let a = &mut store[i];
                a.libs = s.bits;
                a.unambiguous = true;
            }
            KmerRecord::Ambiguous(s) | KmerRecord::NonMutual(s) => {
                if !f.ambiguous {
                    continue;
                }
                if s.kmer % f.slicing != f.slice {
                    continue;
                }
                if s.count < f.min_count || s.count > f.max_count {
                    continue;
                }
                // loaded for masking purposes; stays marked ambiguous
                let i = idx.insert_new(s.kmer, s.count)?;
                store[i].libs = s.bits;
            }
        }
    }
    Ok(())
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn slash_advances_the_sequence_set() {
        let files: Vec<String> = ["a.fa", "/", "b.fa", "c.fa", "/", "d.fa"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            seq_sets(&files),
            [(1, "a.fa"), (2, "b.fa"), (2, "c.fa"), (3, "d.fa")]
        );
    }
}
