//! Text record formats shared by the table and contig pipelines.
//!
//! A k-mer table line is tagged by its first character: `1` a mutual SNPmer
//! pair, `0` a confirmed unpartnered k-mer, `x` an ambiguously pairable one,
//! `p` a one-sided (non-mutual) partnering. K-mers, counts and library
//! bitmaps are hex (k-mers zero-padded to `(k+1)/2` digits); SNP position,
//! xormask and flip are decimal. `#` lines are comments, some of which carry
//! run settings for downstream commands.
//!
//! Contig and read-kmer files carry the same records prefixed with a mapping
//! position and strand, under `>` headers.

use std::fmt::Write as _;

use anyhow::Context;

use crate::kmers::{Kmer, KmerCoder};
use crate::partner::Subst;

/// Mutual SNPmer pair: lesser-encoded allele first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PairRecord {
    pub kmer1: Kmer,
    pub count1: u64,
    pub bits1: u64,
    /// 1-based SNP offset within `kmer1`.
    pub pos: u8,
    pub xor_mask: Subst,
    /// `kmer2` is reverse-complemented in the table relative to `kmer1`.
    pub flip: bool,
    pub kmer2: Kmer,
    pub count2: u64,
    pub bits2: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SingleRecord {
    pub kmer: Kmer,
    pub count: u64,
    pub bits: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KmerRecord {
    Paired(PairRecord),
    Unpaired(SingleRecord),
    Ambiguous(SingleRecord),
    NonMutual(SingleRecord),
}

fn hex_field(tok: Option<&str>, line: &str) -> anyhow::Result<u64> {
    let tok = tok.ok_or_else(|| anyhow!("truncated record line: {line}"))?;
    u64::from_str_radix(tok, 16).with_context(|| format!("bad hex field '{tok}' in line: {line}"))
}

fn dec_field(tok: Option<&str>, line: &str) -> anyhow::Result<u64> {
    let tok = tok.ok_or_else(|| anyhow!("truncated record line: {line}"))?;
    tok.parse()
        .with_context(|| format!("bad decimal field '{tok}' in line: {line}"))
}

fn parse_single<'a, I: Iterator<Item = &'a str>>(
    mut it: I,
    line: &str,
) -> anyhow::Result<SingleRecord> {
    Ok(SingleRecord {
        kmer: hex_field(it.next(), line)?,
        count: hex_field(it.next(), line)?,
        bits: hex_field(it.next(), line)?,
    })
}

fn parse_pair<'a, I: Iterator<Item = &'a str>>(
    mut it: I,
    line: &str,
) -> anyhow::Result<PairRecord> {
    Ok(PairRecord {
        kmer1: hex_field(it.next(), line)?,
        count1: hex_field(it.next(), line)?,
        bits1: hex_field(it.next(), line)?,
        pos: dec_field(it.next(), line)? as u8,
        xor_mask: Subst::from_u8(dec_field(it.next(), line)? as u8)?,
        flip: dec_field(it.next(), line)? != 0,
        kmer2: hex_field(it.next(), line)?,
        count2: hex_field(it.next(), line)?,
        bits2: hex_field(it.next(), line)?,
    })
}

/// Parse one tagged k-mer table line. Comments give `None`; an unrecognized
/// tag or a malformed record is an error with the line echoed.
pub fn parse_table_line(line: &str) -> anyhow::Result<Option<KmerRecord>> {
    let mut it = line.split_whitespace();
    let rec = match it.next() {
        None => return Ok(None),
        Some("1") => KmerRecord::Paired(parse_pair(it, line)?),
        Some("0") => KmerRecord::Unpaired(parse_single(it, line)?),
        Some("x") => KmerRecord::Ambiguous(parse_single(it, line)?),
        Some("p") => KmerRecord::NonMutual(parse_single(it, line)?),
        Some(t) if t.starts_with('#') => return Ok(None),
        Some(t) => return Err(anyhow!("unrecognized record tag '{t}' in line: {line}")),
    };
    Ok(Some(rec))
}

/// Parse an untagged `kmer count bits` line (all hex) as dumped by the
/// counting stage. Lines not starting with a hex digit (headers, comments)
/// are skipped as `None`.
pub fn parse_bare_line(line: &str) -> anyhow::Result<Option<SingleRecord>> {
    if !line.starts_with(|c: char| c.is_ascii_hexdigit()) {
        return Ok(None);
    }
    Ok(Some(parse_single(line.split_whitespace(), line)?))
}

/// A table record carrying its mapping within a contig or read: a 1-based
/// start position and a strand flip relative to the container.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MappedRecord {
    pub pos: u32,
    pub flip: bool,
    pub rec: KmerRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedLine {
    Record(MappedRecord),
    /// `>` header line; carries everything after the `>`.
    Header(String),
    Comment,
}

/// Parse one line of a contig or read-kmer file. The leading tag character
/// is redundant with the field count and ignored; 11 following fields make a
/// pair, 5 a single k-mer.
pub fn parse_mapped_line(line: &str) -> anyhow::Result<MappedLine> {
    if let Some(rest) = line.strip_prefix('>') {
        return Ok(MappedLine::Header(rest.to_owned()));
    }
    if line.starts_with('#') || line.trim().is_empty() {
        return Ok(MappedLine::Comment);
    }
    let mut it = line.split_whitespace();
    let _tag = it.next();
    let pos = dec_field(it.next(), line)? as u32;
    let flip = dec_field(it.next(), line)? != 0;
    let rest: Vec<&str> = it.collect();
    let rec = match rest.len() {
        9 => KmerRecord::Paired(parse_pair(rest.into_iter(), line)?),
        3 => KmerRecord::Unpaired(parse_single(rest.into_iter(), line)?),
        n => {
            return Err(anyhow!(
                "expected 3 or 9 k-mer fields, found {n} in line: {line}"
            ))
        }
    };
    Ok(MappedLine::Record(MappedRecord { pos, flip, rec }))
}

/// `kmer count bits` formatted the way every dump writes it: k-mer hex
/// zero-padded to `(k+1)/2` digits, count and bitmap in bare hex.
pub fn table_fields(coder: &KmerCoder, kmer: Kmer, count: u64, bits: u64) -> String {
    format!(
        "{:0width$x}\t{:x}\t{:x}",
        kmer,
        count,
        bits,
        width = coder.hex_width()
    )
}

/// Full pair line body (without the leading tag).
pub fn pair_fields(coder: &KmerCoder, r: &PairRecord) -> String {
    let mut s = table_fields(coder, r.kmer1, r.count1, r.bits1);
    let _ = write!(
        s,
        "\t{}\t{}\t{}\t{}",
        r.pos,
        r.xor_mask as u8,
        u8::from(r.flip),
        table_fields(coder, r.kmer2, r.count2, r.bits2)
    );
    s
}

/// Run settings carried as `#tag: value` comment lines at the head of a
/// table dump, so downstream commands can configure themselves from their
/// input instead of repeating options.
#[derive(Debug, Default, Clone)]
pub struct Settings {
    pub oligo_len: Option<usize>,
    pub slicing: Option<u64>,
    pub slice: Option<u64>,
    pub soft_mask: Option<bool>,
    pub distinct: Option<u64>,
}

impl Settings {
    /// Absorb a settings tag from a comment line. Unknown comments are left
    /// alone; returns false once the settings section is over (`#distinct:`
    /// doubles as a terminator for files predating `#end_settings`).
    pub fn absorb(&mut self, line: &str) -> anyhow::Result<bool> {
        let mut it = line.split_whitespace();
        let tag = match it.next() {
            Some(t) if t.starts_with('#') => t,
            _ => return Ok(false),
        };
        match tag {
            "#oligo_len:" => self.oligo_len = Some(dec_field(it.next(), line)? as usize),
            "#slicing_fac:" => self.slicing = Some(dec_field(it.next(), line)?),
            "#slice_#:" => self.slice = Some(dec_field(it.next(), line)?),
            "#soft_mask:" => self.soft_mask = Some(dec_field(it.next(), line)? != 0),
            "#distinct:" => {
                self.distinct = Some(dec_field(it.next(), line)?);
                return Ok(false);
            }
            "#end_settings" => return Ok(false),
            _ => {} // other comments are skipped
        }
        Ok(true)
    }

    /// The settings block written at the head of a dump.
    pub fn to_comments(&self) -> String {
        let mut s = String::new();
        if let Some(v) = self.oligo_len {
            let _ = writeln!(s, "#oligo_len:\t{v}");
        }
        if let Some(v) = self.slicing {
            let _ = writeln!(s, "#slicing_fac:\t{v}");
        }
        if let Some(v) = self.slice {
            let _ = writeln!(s, "#slice_#:\t{v}");
        }
        if let Some(v) = self.soft_mask {
            let _ = writeln!(s, "#soft_mask:\t{}", u8::from(v));
        }
        if let Some(v) = self.distinct {
            let _ = writeln!(s, "#distinct:\t{v}");
        }
        s.push_str("#end_settings\n");
        s
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn pair_lines_round_trip() {
        let coder = KmerCoder::new(23).unwrap();
        let r = PairRecord {
            kmer1: 0x3ab,
            count1: 0x1f,
            bits1: 0x5,
            pos: 12,
            xor_mask: Subst::Transition,
            flip: true,
            kmer2: 0x7fff_0000_1,
            count2: 0x2,
            bits2: 0x6,
        };
        let line = format!("1\t{}", pair_fields(&coder, &r));
        assert_eq!(line, "1\t0000000003ab\t1f\t5\t12\t2\t1\t0007fff00001\t2\t6");
        match parse_table_line(&line).unwrap() {
            Some(KmerRecord::Paired(p)) => assert_eq!(p, r),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn table_tags_and_comments() {
        assert!(parse_table_line("# anything").unwrap().is_none());
        assert!(parse_table_line("").unwrap().is_none());
        match parse_table_line("x 3ab 2 5").unwrap() {
            Some(KmerRecord::Ambiguous(s)) => {
                assert_eq!((s.kmer, s.count, s.bits), (0x3ab, 2, 5))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_table_line("z 3ab 2 5").is_err());
        assert!(parse_table_line("1 3ab 2").is_err());
    }

    #[test]
    fn bare_lines_skip_non_records() {
        let r = parse_bare_line("00ff\t3\t2").unwrap().unwrap();
        assert_eq!((r.kmer, r.count, r.bits), (0xff, 3, 2));
        assert!(parse_bare_line(">header").unwrap().is_none());
        assert!(parse_bare_line("# comment").unwrap().is_none());
        assert!(parse_bare_line("ff only_one_more").is_err());
    }

    #[test]
    fn mapped_lines() {
        match parse_mapped_line(">r1.37").unwrap() {
            MappedLine::Header(h) => assert_eq!(h, "r1.37"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse_mapped_line("# note").unwrap(), MappedLine::Comment);
        match parse_mapped_line("0 101 1 3ab 2 5").unwrap() {
            MappedLine::Record(m) => {
                assert_eq!((m.pos, m.flip), (101, true));
                assert!(matches!(m.rec, KmerRecord::Unpaired(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse_mapped_line("1 7 0 3ab 2 5 12 2 1 4cd 3 6").unwrap() {
            MappedLine::Record(m) => {
                assert_eq!((m.pos, m.flip), (7, false));
                assert!(matches!(m.rec, KmerRecord::Paired(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_mapped_line("1 7 0 3ab 2 5 12").is_err());
    }

    #[test]
    fn settings_block_round_trips() {
        let s = Settings {
            oligo_len: Some(23),
            slicing: Some(11),
            slice: Some(5),
            soft_mask: Some(true),
            distinct: Some(123456),
        };
        let mut read = Settings::default();
        for line in s.to_comments().lines() {
            if !read.absorb(line).unwrap() {
                break;
            }
            assert!(line.starts_with('#'));
        }
        assert_eq!(read.oligo_len, Some(23));
        assert_eq!(read.slicing, Some(11));
        assert_eq!(read.slice, Some(5));
        assert_eq!(read.soft_mask, Some(true));
        // #distinct: terminates the block but is still absorbed
        assert_eq!(read.distinct, Some(123456));
    }
}
