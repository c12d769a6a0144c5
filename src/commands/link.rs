//! Link reads to k-mer contigs along alignment diagonals.
//!
//! Loads a contig file of mapped k-mer records, chaining consecutive k-mers
//! of each contig through their up/down links, then streams read-kmer files.
//! Hits of one read (or read pair) are clustered by (contig, diagonal,
//! strand, mate) and reported when the next read starts. SNPmer pairs are
//! keyed by their lesser-encoded allele so a read carrying either allele
//! lands on the same table entry.

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::annot::{AnnotStore, Link};
use crate::cli::LinkOpts;
use crate::commands::seq_sets;
use crate::diag::DiagClusters;
use crate::index::{KmerIndex, Probe};
use crate::kmers::Kmer;
use crate::records::{parse_mapped_line, KmerRecord, MappedLine};

struct Contig {
    /// Last chained k-mer: (slot, strand flip within the contig).
    last: Option<(usize, bool)>,
}

pub fn run(opts: &LinkOpts) -> anyhow::Result<()> {
    // unsliced: slicing was resolved by the upstream table commands
    let mut idx = KmerIndex::new(opts.hash_size, 1, 0, opts.oligo_len, 0, 0)?;
    let mut store = AnnotStore::new(idx.size());
    // contig 0 is the null contig: read hits on it are ignored
    let mut contigs = vec![Contig { last: None }];
    let rdr = CompressIo::new()
        .path(&opts.contigs)
        .bufreader()
        .with_context(|| format!("Could not open contig file {}", opts.contigs.display()))?;
    load_contigs(rdr, &mut idx, &mut store, &mut contigs)?;
    info!(
        "Loaded {} contigs holding {} k-mers",
        contigs.len() - 1,
        idx.distinct()
    );

    let mut out = CompressIo::new()
        .bufwriter()
        .with_context(|| "Could not open output")?;
    for (set, file) in seq_sets(&opts.files) {
        info!("Opening read-kmers file {file} (set {set})");
        let rdr = CompressIo::new()
            .path(file)
            .bufreader()
            .with_context(|| format!("Could not open read-kmers file {file}"))?;
        link_reads(&idx, &mut store, rdr, &mut out)?;
        writeln!(out, "# Complete for {file}")?;
    }
    out.flush().with_context(|| "Error flushing output")
}

/// Load mapped k-mer records into the index, chaining each contig's k-mers
/// in file order. Every `>` header opens the next contig id.
fn load_contigs<R: BufRead>(
    rdr: R,
    idx: &mut KmerIndex,
    store: &mut AnnotStore,
    contigs: &mut Vec<Contig>,
) -> anyhow::Result<()> {
    for line in rdr.lines() {
        let line = line?;
        let m = match parse_mapped_line(&line)? {
            MappedLine::Header(h) => {
                let ctype = h.as_bytes().first().copied().unwrap_or(b'?');
                contigs.push(Contig { last: None });
                debug!("contig {} ({}): >{h}", contigs.len() - 1, ctype as char);
                continue;
            }
            MappedLine::Comment => continue,
            MappedLine::Record(m) => m,
        };
        let cid = (contigs.len() - 1) as u32;
        let slot = match m.rec {
            KmerRecord::Paired(p) => {
                // the lesser-encoded allele stands for the pair
                let slot = idx.insert_new(p.kmer1, p.count1)?;
                let a = &mut store[slot];
                a.libs = p.bits1;
                a.unambiguous = true;
                a.partnered = true;
                a.pos = p.pos;
                a.xor_mask = p.xor_mask;
                a.flip = p.flip;
                slot
            }
            KmerRecord::Unpaired(s) => {
                let slot = idx.insert_new(s.kmer, s.count)?;
                let a = &mut store[slot];
                a.libs = s.bits;
                a.unambiguous = true;
                slot
            }
            _ => return Err(anyhow!("unexpected record tag in contig line: {line}")),
        };
        let a = &mut store[slot];
        a.contig = cid;
        a.contig_pos = m.pos;
        a.contig_flip = m.flip;
        add_to_contig(store, &mut contigs[cid as usize], slot);
    }
    Ok(())
}

/// Chain a newly loaded k-mer onto its contig. The previous k-mer gets a
/// forward link on its downstream side (up when it maps flipped) and the new
/// one a matching back link.
fn add_to_contig(store: &mut AnnotStore, contig: &mut Contig, slot: usize) {
    let flip = store[slot].contig_flip;
    if let Some((prev, prev_flip)) = contig.last {
        let dist = store[slot].contig_pos - store[prev].contig_pos;
        let diff_strand = prev_flip != flip;
        let fwd = Link {
            slot,
            dist,
            flip: diff_strand,
            fuzzy: false,
        };
        if prev_flip {
            store[prev].up = Some(fwd);
        } else {
            store[prev].down = Some(fwd);
        }
        let back = Link {
            slot: prev,
            dist,
            flip: diff_strand,
            fuzzy: false,
        };
        if flip {
            store[slot].down = Some(back);
        } else {
            store[slot].up = Some(back);
        }
    }
    contig.last = Some((slot, flip));
}

fn link_reads<R: BufRead, W: Write>(
    idx: &KmerIndex,
    store: &mut AnnotStore,
    rdr: R,
    out: &mut W,
) -> anyhow::Result<()> {
    let mut prev_rid = String::new();
    let mut rid = String::new();
    let mut revmate = false;
    let mut mates_ol = false;
    let mut dvec = DiagClusters::new();
    let mut kvec: Vec<usize> = Vec::new();
    let mut snp_f: Vec<Kmer> = Vec::new();
    let mut snp_r: Vec<Kmer> = Vec::new();

    for line in rdr.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let m = match parse_mapped_line(&line)? {
            MappedLine::Header(h) => {
                rid = h.split_whitespace().next().unwrap_or_default().to_owned();
                revmate = false;
                continue;
            }
            MappedLine::Comment => {
                // a bare comment separates the mates of a read pair
                revmate = true;
                continue;
            }
            MappedLine::Record(m) => m,
        };
        // reads list their own allele first; key on the lesser-encoded one
        let (kmer, rflip, snpmer) = match m.rec {
            KmerRecord::Paired(p) => {
                if p.kmer2 < p.kmer1 {
                    (p.kmer2, m.flip ^ p.flip, Some(p.kmer1))
                } else {
                    (p.kmer1, m.flip, Some(p.kmer1))
                }
            }
            KmerRecord::Unpaired(s) => (s.kmer, m.flip, None),
            _ => return Err(anyhow!("unexpected record tag in read-kmer line: {line}")),
        };
        let k_id = match idx.lookup_loc(kmer) {
            Probe::Found(i) => i,
            _ => continue,
        };
        if store[k_id].contig == 0 {
            continue;
        }
        if !prev_rid.is_empty() && prev_rid != rid {
            if !dvec.is_empty() {
                report_diags(out, &prev_rid, &dvec, mates_ol, &snp_f, &snp_r)?;
            }
            dvec.clear();
            for &ki in &kvec {
                store[ki].in_fwd = false;
            }
            kvec.clear();
            mates_ol = false;
            snp_f.clear();
            snp_r.clear();
        }
        prev_rid = rid.clone();
        let (contig, cpos, cflip) = {
            let a = &store[k_id];
            (a.contig, a.contig_pos, a.contig_flip)
        };
        dvec.add_hit(contig, cpos, cflip, m.pos, rflip, revmate);
        if revmate {
            if store[k_id].in_fwd {
                mates_ol = true;
            }
            if let Some(w) = snpmer {
                snp_r.push(w);
            }
        } else {
            store[k_id].in_fwd = true;
            kvec.push(k_id);
            if let Some(w) = snpmer {
                snp_f.push(w);
            }
        }
    }
    if !dvec.is_empty() {
        report_diags(out, &prev_rid, &dvec, mates_ol, &snp_f, &snp_r)?;
    }
    for &ki in &kvec {
        store[ki].in_fwd = false;
    }
    Ok(())
}

/// One line per clustered diagonal:
/// `contig <tab> read(fwd-span[;rev-span])diag:strand mate[left,right]#hits`
/// with the mate separator `;` becoming `:` when the mates share k-mers, and
/// the read's SNPmer alleles appended once per line.
fn report_diags<W: Write>(
    out: &mut W,
    rid: &str,
    dvec: &DiagClusters,
    mates_ol: bool,
    snp_f: &[Kmer],
    snp_r: &[Kmer],
) -> anyhow::Result<()> {
    let spans = dvec.spans();
    let mut snps = String::new();
    if !snp_f.is_empty() || !snp_r.is_empty() {
        snps.push('(');
        for w in snp_f {
            let _ = write!(snps, "{w:x},");
        }
        snps.push(';');
        for w in snp_r {
            let _ = write!(snps, "{w:x},");
        }
        snps.push(')');
    }
    let mut mates = format!(
        "{},{}",
        if spans.max_fwd == 0 { 0 } else { spans.min_fwd },
        spans.max_fwd
    );
    if spans.max_rev > 0 {
        let _ = write!(
            mates,
            "{}{},{}",
            if mates_ol { ':' } else { ';' },
            spans.min_rev,
            spans.max_rev
        );
    }
    for d in dvec.iter() {
        writeln!(
            out,
            "{}\t{rid}({mates}){}:{}{}[{},{}]#{}{snps}",
            d.contig,
            d.diag,
            if d.anti { '-' } else { '+' },
            if d.revmate { 'r' } else { 'f' },
            d.rpos_l,
            d.rpos_r,
            d.n_kmers
        )?;
    }
    Ok(())
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[allow(dead_code)]
    fn contig_setup(table: &str) -> (KmerIndex, AnnotStore, Vec<Contig>) {
        let mut idx = KmerIndex::new(1009, 1, 0, 4, 0, 0).unwrap();
        let mut store = AnnotStore::new(idx.size());
        let mut contigs = vec![Contig { last: None }];
        load_contigs(table.as_bytes(), &mut idx, &mut store, &mut contigs).unwrap();
        (idx, store, contigs)
    }

    #[test]
    fn contig_kmers_get_chained() {
        // two forward k-mers five bases apart in contig 1
        let (idx, store, contigs) = contig_setup(">F.1\n0 10 0 1b 2 0\n0 15 0 46 3 0\n");
        assert_eq!(contigs.len(), 2);
        assert_eq!(idx.distinct(), 2);
        let s1 = match idx.lookup_loc(0x1b) {
            Probe::Found(s) => s,
            p => panic!("unexpected {p:?}"),
        };
        let s2 = match idx.lookup_loc(0x46) {
            Probe::Found(s) => s,
            p => panic!("unexpected {p:?}"),
        };
        assert_eq!(store[s1].contig, 1);
        assert_eq!((store[s1].contig_pos, store[s2].contig_pos), (10, 15));
        let down = store[s1].down.as_ref().unwrap();
        assert_eq!((down.slot, down.dist, down.flip), (s2, 5, false));
        let up = store[s2].up.as_ref().unwrap();
        assert_eq!((up.slot, up.dist, up.flip), (s1, 5, false));
        assert!(store[s1].up.is_none() && store[s2].down.is_none());
    }

    #[test]
    fn flipped_kmers_chain_on_opposite_sides() {
        let (idx, store, _) = contig_setup(">F.1\n0 10 0 1b 2 0\n0 15 1 46 3 0\n");
        let s1 = match idx.lookup_loc(0x1b) {
            Probe::Found(s) => s,
            p => panic!("unexpected {p:?}"),
        };
        let s2 = match idx.lookup_loc(0x46) {
            Probe::Found(s) => s,
            p => panic!("unexpected {p:?}"),
        };
        // second k-mer maps flipped: its back link sits on its down side
        let down = store[s2].down.as_ref().unwrap();
        assert_eq!((down.slot, down.flip), (s1, true));
        assert!(store[s1].down.as_ref().unwrap().flip);
    }

    #[test]
    fn reads_cluster_on_diagonals() {
        let (idx, mut store, _) = contig_setup(">F.1\n0 10 0 1b 2 0\n0 15 0 46 3 0\n");
        let reads = ">r1 extra\n0 3 0 1b 2 0\n0 8 0 46 2 0\n>r2\n0 2 0 46 2 0\n";
        let mut out = Vec::new();
        link_reads(&idx, &mut store, reads.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        // both r1 hits land on diagonal 10-3 = 15-8 = 7
        assert_eq!(lines.next(), Some("1\tr1(3,8)7:+f[3,8]#2"));
        assert_eq!(lines.next(), Some("1\tr2(2,2)13:+f[2,2]#1"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn mate_pairs_and_snpmer_lists() {
        let (idx, mut store, _) = contig_setup(">F.1\n0 10 0 1b 2 0\n");
        // both mates hit the same SNPmer: overlap marked with ':'
        let reads = ">r3\n1 4 0 1b 2 0 1 3 1 46 2 0\n#\n1 9 0 1b 2 0 1 3 1 46 2 0\n";
        let mut out = Vec::new();
        link_reads(&idx, &mut store, reads.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("1\tr3(4,4:9,9)6:+f[4,4]#1(1b,;1b,)"));
        assert_eq!(lines.next(), Some("1\tr3(4,4:9,9)1:+r[9,9]#1(1b,;1b,)"));
        assert_eq!(lines.next(), None);
        // mate-sharing flags were cleared at the end of the stream
        for (slot, _) in idx.iter_occupied() {
            assert!(!store[slot].in_fwd);
        }
    }
}
