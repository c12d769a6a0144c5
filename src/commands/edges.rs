//! Build a k-mer adjacency graph from reads over a SNPmer table.
//!
//! Loads a tagged table, then streams reads: each window that resolves to a
//! representative slot is linked to the previous resolved window of the same
//! sequence, in both directions with mirrored orientations. SNPmer pairs
//! share one representative node, so both alleles feed the same adjacencies.

use std::io::Write;

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::annot::AnnotStore;
use crate::cli::EdgesOpts;
use crate::commands::{load_table, seq_sets, TableFilters};
use crate::graph::{make_orient, Graph};
use crate::index::KmerIndex;
use crate::partner::rep_slot;
use crate::reader::{SeqEvent, SeqKmers};

pub fn run(opts: &EdgesOpts) -> anyhow::Result<()> {
    // the index itself is unsliced: pair records carry k-mers from any slice
    let mut idx = KmerIndex::new(opts.hash_size, 1, 0, opts.oligo_len, 0, 0)?;
    let mut store = AnnotStore::new(idx.size());
    let rdr = CompressIo::new()
        .path(&opts.table)
        .bufreader()
        .with_context(|| format!("Could not open table {}", opts.table.display()))?;
    load_table(
        rdr,
        &mut idx,
        &mut store,
        &TableFilters {
            positions: &opts.positions,
            ambiguous: opts.ambiguous,
            min_count: opts.min_count,
            max_count: opts.max_count,
            slicing: opts.slicing,
            slice: opts.slice,
        },
    )?;
    info!("Loaded {} k-mers from the table", idx.distinct());

    let mut graph = Graph::new(idx.size());
    let mut edge_inserts = 0u64;

    for (set, file) in seq_sets(&opts.files) {
        info!("Opening sequence file {file} (set {set})");
        let rdr = CompressIo::new()
            .path(file)
            .bufreader()
            .with_context(|| format!("Could not open sequence file {file}"))?;
        let mut kmers = SeqKmers::new(*idx.coder(), rdr, opts.soft_mask);
        // previous resolved window: (slot, strand, end position)
        let mut prev: Option<(usize, bool, u64)> = None;
        while let Some(ev) = kmers.next_pos()? {
            match ev {
                SeqEvent::Kmer { end_pos } => {
                    let w_norm = kmers.gen().current();
                    let mut w_strand = w_norm != kmers.gen().fwd();
                    let w_rep = match rep_slot(&idx, &store, w_norm, &mut w_strand)? {
                        Some(s) => s,
                        None => continue,
                    };
                    if let Some((p_rep, p_strand, p_off)) = prev {
                        edge_inserts += 1;
                        let dist = (end_pos - p_off) as u32;
                        graph[p_rep].add_edge(w_rep, make_orient(p_strand, w_strand), dist, 1);
                        graph[w_rep].add_edge(p_rep, make_orient(!w_strand, !p_strand), dist, 1);
                    }
                    prev = Some((w_rep, w_strand, end_pos));
                }
                SeqEvent::NewSeq => prev = None,
            }
        }
        debug!("done with {file}: {edge_inserts} edge inserts so far");
    }

    match &opts.edge_file {
        Some(path) => {
            let mut out = CompressIo::new()
                .path(path)
                .bufwriter()
                .with_context(|| format!("Could not open edge output {}", path.display()))?;
            let coder = *idx.coder();
            for (slot, cell) in idx.iter_occupied() {
                let w = coder.get_kmer(cell);
                let node = &graph[slot];
                for e in node.up.iter().chain(node.down.iter()) {
                    // zero reads marks an overflow sentinel
                    if e.nreads == 0 {
                        continue;
                    }
                    writeln!(
                        out,
                        "{:x}\t{:x}\t{}\t{}\t{}",
                        w,
                        coder.get_kmer(idx.cell(e.sink)),
                        e.orient as u8,
                        e.dist,
                        e.nreads
                    )?;
                }
            }
            out.flush().with_context(|| "Error flushing edge output")
        }
        None => {
            let mut with_edges = 0u64;
            let mut n_edges = 0u64;
            for (slot, _) in idx.iter_occupied() {
                let d = graph[slot].degree() as u64;
                if d > 0 {
                    with_edges += 1;
                    n_edges += d;
                }
            }
            println!(
                "Distinct/useful: {}, #w/edges: {with_edges}, #edgeInserts: {edge_inserts}, #edges: {n_edges}",
                idx.distinct()
            );
            Ok(())
        }
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;
    #[allow(unused_imports)]
    use crate::graph::Orient;
    #[allow(unused_imports)]
    use crate::records::{parse_table_line, KmerRecord};

    #[allow(dead_code)]
    fn table_from(lines: &[&str], positions: &[bool]) -> (KmerIndex, AnnotStore) {
        let mut idx = KmerIndex::new(1009, 1, 0, 4, 0, 0).unwrap();
        let mut store = AnnotStore::new(idx.size());
        let joined = lines.join("\n");
        load_table(
            joined.as_bytes(),
            &mut idx,
            &mut store,
            &TableFilters {
                positions,
                ambiguous: false,
                min_count: 2,
                max_count: 50,
                slicing: 1,
                slice: 0,
            },
        )
        .unwrap();
        (idx, store)
    }

    #[test]
    fn pair_records_install_both_kmers() {
        // AAAC / GTTA: SNP at position 1, complement substitution, flipped
        let mut positions = vec![false; 5];
        positions[1] = true;
        let (idx, store) = table_from(&["1\t01\t03\t5\t1\t3\t1\tbc\t03\t4"], &positions);
        assert_eq!(idx.distinct(), 2);
        for (slot, cell) in idx.iter_occupied() {
            let ann = &store[slot];
            assert!(ann.unambiguous && ann.partnered);
            // flipped pair: the second k-mer's SNP sits at k + 1 - pos
            let expect = if idx.coder().get_kmer(cell) == 0x01 { 1 } else { 4 };
            assert_eq!(ann.pos, expect);
        }
    }

    #[test]
    fn count_filters_drop_pair_records() {
        let mut positions = vec![false; 5];
        positions[1] = true;
        // count1 below the minimum
        let (idx, _) = table_from(&["1\t01\t01\t5\t1\t3\t1\tbc\t03\t4"], &positions);
        assert_eq!(idx.distinct(), 0);
        // combined count above the maximum
        let (idx, _) = table_from(&["1\t01\t30\t5\t1\t3\t1\tbc\t28\t4"], &positions);
        assert_eq!(idx.distinct(), 0);
        // position not selected
        let (idx, _) = table_from(&["1\t01\t03\t5\t2\t3\t1\tb4\t03\t4"], &positions);
        assert_eq!(idx.distinct(), 0);
    }

    #[test]
    fn linked_windows_get_mirrored_edges() {
        // unpaired records for every canonical 4-mer of ACGTGA, min count met
        let (idx, store) = table_from(
            &["0\t1b\t02\t0", "0\t46\t02\t0", "0\tb8\t02\t0"],
            &[false; 5],
        );
        let mut graph = Graph::new(idx.size());
        let mut kmers = SeqKmers::new(*idx.coder(), ">seq\nACGTGA\n".as_bytes(), false);
        let mut prev: Option<(usize, bool, u64)> = None;
        let mut inserts = 0;
        while let Some(ev) = kmers.next_pos().unwrap() {
            if let SeqEvent::Kmer { end_pos } = ev {
                let w_norm = kmers.gen().current();
                let mut w_strand = w_norm != kmers.gen().fwd();
                if let Some(w_rep) = rep_slot(&idx, &store, w_norm, &mut w_strand).unwrap() {
                    if let Some((p_rep, p_strand, p_off)) = prev {
                        inserts += 1;
                        let dist = (end_pos - p_off) as u32;
                        graph[p_rep].add_edge(w_rep, make_orient(p_strand, w_strand), dist, 1);
                        graph[w_rep].add_edge(p_rep, make_orient(!w_strand, !p_strand), dist, 1);
                    }
                    prev = Some((w_rep, w_strand, end_pos));
                }
            }
        }
        assert_eq!(inserts, 2);
        // every edge insert lands twice, once per direction
        let total: usize = (0..idx.size()).map(|s| graph[s].degree()).sum();
        assert_eq!(total, 4);
    }
}
