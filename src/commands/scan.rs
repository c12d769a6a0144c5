//! Scan reads against a SNPmer table.
//!
//! Every window of every read is looked up in the loaded table and reported
//! as a tagged line: `1` for a SNPmer pair hit (with the partner's record
//! appended), `N` for an accepted unpartnered hit. Rejected and missing
//! windows produce no line but are tracked in the optional per-read summary
//! string, one character per window position.

use std::io::{BufRead, Write};

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::annot::AnnotStore;
use crate::cli::ScanOpts;
use crate::commands::{load_table, seq_sets, TableFilters};
use crate::index::{KmerIndex, Probe};
use crate::partner::partner_forms;
use crate::reader::{SeqEvent, SeqKmers};
use crate::records::table_fields;

pub fn run(opts: &ScanOpts) -> anyhow::Result<()> {
    let mut idx = KmerIndex::new(opts.hash_size, 1, 0, opts.oligo_len, 0, 0)?;
    let mut store = AnnotStore::new(idx.size());
    let rdr = CompressIo::new()
        .path(&opts.table)
        .bufreader()
        .with_context(|| format!("Could not open table {}", opts.table.display()))?;
    // count filters are left to scan time so low-count hits still register
    load_table(
        rdr,
        &mut idx,
        &mut store,
        &TableFilters {
            positions: &opts.positions,
            ambiguous: opts.ambiguous,
            min_count: 0,
            max_count: u64::MAX,
            slicing: opts.slicing,
            slice: opts.slice,
        },
    )?;
    info!("Loaded {} k-mers from the table", idx.distinct());

    let mut out = CompressIo::new()
        .bufwriter()
        .with_context(|| "Could not open output")?;
    for (set, file) in seq_sets(&opts.files) {
        info!("Scanning sequence file {file} (set {set})");
        let rdr = CompressIo::new()
            .path(file)
            .bufreader()
            .with_context(|| format!("Could not open sequence file {file}"))?;
        scan_reads(opts, &idx, &store, rdr, &mut out)?;
    }
    out.flush().with_context(|| "Error flushing output")
}

fn scan_reads<R: BufRead, W: Write>(
    opts: &ScanOpts,
    idx: &KmerIndex,
    store: &AnnotStore,
    rdr: R,
    out: &mut W,
) -> anyhow::Result<()> {
    let coder = *idx.coder();
    let k = coder.length() as u64;
    let mut kmers = SeqKmers::new(coder, rdr, opts.soft_mask);
    let mut summary = String::new();
    let mut expected = k;
    while let Some(ev) = kmers.next_pos()? {
        match ev {
            SeqEvent::NewSeq => {
                if !summary.is_empty() {
                    writeln!(out, "# Summary: {summary}")?;
                    summary.clear();
                }
                writeln!(out, "{}", kmers.descrip())?;
                expected = k;
            }
            SeqEvent::Kmer { end_pos } => {
                if opts.summary {
                    // windows lost to ambiguous bases
                    for _ in expected..end_pos {
                        summary.push('q');
                    }
                }
                expected = end_pos + 1;
                let w_norm = kmers.gen().current();
                let tag = match idx.lookup_loc(w_norm) {
                    Probe::Found(wi) => hit_line(opts, idx, store, &kmers, wi, out)?,
                    _ => {
                        // distinguish out-of-slice misses from true absences
                        if w_norm % opts.slicing != opts.slice {
                            '-'
                        } else {
                            'e'
                        }
                    }
                };
                if opts.summary {
                    summary.push(tag);
                }
            }
        }
    }
    if !summary.is_empty() {
        writeln!(out, "# Summary: {summary}")?;
    }
    Ok(())
}

/// Report one table hit; returns its summary character.
fn hit_line<R: BufRead, W: Write>(
    opts: &ScanOpts,
    idx: &KmerIndex,
    store: &AnnotStore,
    kmers: &SeqKmers<R>,
    wi: usize,
    out: &mut W,
) -> anyhow::Result<char> {
    let coder = *idx.coder();
    let layout = *idx.layout();
    let w_norm = kmers.gen().current();
    // 0 when the normalized k-mer reads in the same sense as the read
    let strand = u8::from(w_norm != kmers.gen().fwd());
    let start = kmers.oligo_start();
    let ann = &store[wi];
    let count = layout.get_info1(idx.cell(wi));
    if ann.partnered {
        let (_, partner) = partner_forms(&coder, w_norm, ann);
        let pi = match idx.lookup_loc(partner) {
            Probe::Found(s) => s,
            _ => {
                return Err(anyhow!(
                    "failed to find recorded partner {} of {}",
                    coder.to_bases(partner),
                    coder.to_bases(w_norm)
                ))
            }
        };
        let pann = &store[pi];
        writeln!(
            out,
            "1\t{start}\t{strand}\t{}\t{}\t{}\t{}\t{}",
            table_fields(&coder, w_norm, count, ann.libs),
            ann.pos,
            ann.xor_mask as u8,
            ann.flip as u8,
            table_fields(&coder, partner, layout.get_info1(idx.cell(pi)), pann.libs)
        )?;
        return Ok('1');
    }
    if count > opts.max_count || !ann.unambiguous {
        return Ok('r');
    }
    writeln!(
        out,
        "N\t{start}\t{strand}\t{}",
        table_fields(&coder, w_norm, count, ann.libs)
    )?;
    Ok('N')
}

mod test {
    #[allow(unused_imports)]
    use super::*;
    #[allow(unused_imports)]
    use std::path::PathBuf;

    #[allow(dead_code)]
    fn scan_opts(summary: bool) -> ScanOpts {
        let mut positions = vec![false; 5];
        positions[1] = true;
        ScanOpts {
            oligo_len: 4,
            hash_size: 1009,
            slicing: 1,
            slice: 0,
            table: PathBuf::new(),
            positions,
            ambiguous: false,
            max_count: u64::MAX,
            summary,
            soft_mask: false,
            files: Vec::new(),
        }
    }

    #[allow(dead_code)]
    fn loaded(lines: &[&str], opts: &ScanOpts) -> (KmerIndex, AnnotStore) {
        let mut idx = KmerIndex::new(opts.hash_size, 1, 0, opts.oligo_len, 0, 0).unwrap();
        let mut store = AnnotStore::new(idx.size());
        load_table(
            lines.join("\n").as_bytes(),
            &mut idx,
            &mut store,
            &TableFilters {
                positions: &opts.positions,
                ambiguous: opts.ambiguous,
                min_count: 0,
                max_count: u64::MAX,
                slicing: opts.slicing,
                slice: opts.slice,
            },
        )
        .unwrap();
        (idx, store)
    }

    #[test]
    fn pair_hits_report_both_kmers() {
        let opts = scan_opts(false);
        // AAAC / GTTA pair, SNP position 1, complement substitution, flipped
        let (idx, store) = loaded(&["1\t01\t03\t5\t1\t3\t1\tbc\t03\t4"], &opts);
        let mut out = Vec::new();
        scan_reads(&opts, &idx, &store, ">r1\nAAAC\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(">r1"));
        assert_eq!(lines.next(), Some("1\t1\t0\t01\t3\t5\t1\t3\t1\tbc\t3\t4"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn unpartnered_hits_and_summaries() {
        let opts = scan_opts(true);
        let (idx, store) = loaded(&["0\t1b\t02\t0"], &opts);
        // ACGT hits, CGTA misses in-slice, N costs the four windows ending
        // at 6..=9 before ACGT hits again at 10
        let mut out = Vec::new();
        scan_reads(&opts, &idx, &store, ">r1\nACGTANACGT\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(">r1"));
        assert_eq!(lines.next(), Some("N\t1\t0\t1b\t2\t0"));
        assert_eq!(lines.next(), Some("N\t7\t0\t1b\t2\t0"));
        assert_eq!(lines.next(), Some("# Summary: NeqqqqN"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn strand_column_marks_reverse_hits() {
        let opts = scan_opts(false);
        // table holds AAAC; the read carries its reverse complement GTTT
        let (idx, store) = loaded(&["0\t01\t02\t0"], &opts);
        let mut out = Vec::new();
        scan_reads(&opts, &idx, &store, ">r1\nGTTT\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(">r1"));
        assert_eq!(lines.next(), Some("N\t1\t1\t01\t2\t0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn count_cap_rejects_at_scan_time() {
        let mut opts = scan_opts(true);
        opts.max_count = 10;
        // count 0x14 = 20, over the cap
        let (idx, store) = loaded(&["0\t1b\t14\t0"], &opts);
        let mut out = Vec::new();
        scan_reads(&opts, &idx, &store, ">r1\nACGT\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, ">r1\n# Summary: r\n");
    }
}
