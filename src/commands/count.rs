//! Count k-mers across sequence sets.
//!
//! Builds the index over all input FASTA files, OR-ing a per-set presence
//! bit into a side bitmap on every hit, then dumps `kmer count bits` lines
//! (preceded by a settings block) for every k-mer at or above the reporting
//! threshold. Run totals and the count frequency histogram go into a JSON
//! summary file.

use std::io::Write;

use anyhow::Context;
use compress_io::compress::CompressIo;
use serde::Serialize;

use crate::cli::{Config, CountOpts};
use crate::commands::seq_sets;
use crate::index::{KmerIndex, Probe};
use crate::reader::{SeqEvent, SeqKmers};
use crate::records::{table_fields, Settings};

/// Histogram cap: counts above this are lumped into the top bin.
const MAX_FREQ: u64 = 0x3fff;

#[derive(Serialize)]
struct CountSummary<'a> {
    program: &'static str,
    version: &'static str,
    date: String,
    oligo_len: usize,
    hash_size: usize,
    slicing: u64,
    slice: u64,
    sequence_sets: u32,
    sequences: u64,
    total_bases: u64,
    total_unambiguous: u64,
    total_oligos: u64,
    insertions: u64,
    distinct: u64,
    /// `[count, n_kmers]` pairs for every non-empty bin.
    histogram: &'a [(u64, u64)],
}

pub fn run(cfg: &Config, opts: &CountOpts) -> anyhow::Result<()> {
    let mut idx = KmerIndex::new(
        opts.hash_size,
        opts.slicing,
        opts.slice,
        opts.oligo_len,
        0,
        0,
    )?;
    let mut bitmaps = vec![0u64; idx.size()];

    let inputs = seq_sets(&opts.files);
    if let Some((set, _)) = inputs.iter().find(|(set, _)| *set > 64) {
        return Err(anyhow!("sequence set {set} exceeds the 64-bit bitmap"));
    }

    let mut nseqs = 0u64;
    let mut bases = 0u64;
    let mut unambiguous = 0u64;
    let mut oligos = 0u64;

    for (set, file) in inputs {
        info!("Opening sequence file {file} (set {set})");
        let rdr = CompressIo::new()
            .path(file)
            .bufreader()
            .with_context(|| format!("Could not open sequence file {file}"))?;
        let mut kmers = SeqKmers::new(*idx.coder(), rdr, opts.soft_mask);
        let bit = 1u64 << (set - 1);
        while let Some(ev) = kmers.next_pos()? {
            match ev {
                SeqEvent::Kmer { .. } => {
                    let w = kmers.gen().current();
                    match idx.insert(w, 1, 0, 0)? {
                        Probe::Found(loc) | Probe::Missing(loc) => bitmaps[loc] |= bit,
                        _ => {}
                    }
                }
                SeqEvent::NewSeq => {
                    if kmers.seq_count() % 100_000 == 0 {
                        info!("@ {} sequences: {}", kmers.seq_count(), kmers.descrip());
                    }
                }
            }
        }
        debug!("done with {file}");
        nseqs += kmers.seq_count();
        bases += kmers.base_count();
        unambiguous += kmers.unambiguous_count();
        oligos += kmers.oligo_count();
    }

    let settings = Settings {
        oligo_len: Some(opts.oligo_len),
        slicing: Some(opts.slicing),
        slice: Some(opts.slice),
        soft_mask: Some(opts.soft_mask),
        distinct: Some(idx.distinct()),
    };
    let mut out = CompressIo::new()
        .bufwriter()
        .with_context(|| "Could not open table output")?;
    out.write_all(settings.to_comments().as_bytes())?;

    let mut histogram = vec![0u64; (MAX_FREQ + 1) as usize];
    let layout = *idx.layout();
    for (slot, cell) in idx.iter_occupied() {
        let freq = layout.get_info1(cell);
        histogram[freq.min(MAX_FREQ) as usize] += 1;
        if freq < opts.min_report {
            continue;
        }
        writeln!(
            out,
            "{}",
            table_fields(layout.coder(), layout.coder().get_kmer(cell), freq, bitmaps[slot])
        )?;
    }
    out.flush()?;

    let hist: Vec<(u64, u64)> = histogram
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, &n)| n > 0)
        .map(|(f, &n)| (f as u64, n))
        .collect();

    let summary = CountSummary {
        program: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        date: cfg.date().to_rfc2822(),
        oligo_len: opts.oligo_len,
        hash_size: idx.size(),
        slicing: opts.slicing,
        slice: opts.slice,
        sequence_sets: seq_sets(&opts.files).last().map(|(s, _)| *s).unwrap_or(1),
        sequences: nseqs,
        total_bases: bases,
        total_unambiguous: unambiguous,
        total_oligos: oligos,
        insertions: idx.insertions(),
        distinct: idx.distinct(),
        histogram: &hist,
    };
    let name = format!("{}.json", opts.prefix);
    debug!("Writing JSON summary to {name}");
    let wrt = CompressIo::new()
        .path(&name)
        .bufwriter()
        .with_context(|| "Could not open output JSON file")?;
    serde_json::to_writer_pretty(wrt, &summary)
        .with_context(|| "Error writing out JSON summary")
}
