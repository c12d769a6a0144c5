//! Streams k-mers out of FASTA sequence files.
//!
//! Every location in the input generates a k-mer unless there are too few
//! unambiguous bases; locations that cannot generate one are silently
//! skipped except for advancing the position counter. Positions are 1-based
//! indices of the last base of the window within the current sequence.

use std::io::BufRead;

use crate::kmers::{encode_base, KmerCoder, KmerGen};

/// One step of the k-mer stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeqEvent {
    /// Entered a new sequence; its description line is available.
    NewSeq,
    /// A complete window ending at this 1-based position of the current
    /// sequence; the window itself is read off [`SeqKmers::gen`].
    Kmer { end_pos: u64 },
}

enum Scan {
    Base(u8),
    Ambiguous,
    NewSeq,
    Eof,
}

pub struct SeqKmers<R: BufRead> {
    rdr: R,
    gen: KmerGen,
    line: String,
    ix: usize,
    descrip: String,
    soft_mask: bool,
    sequences: u64,
    all_bases: u64,
    unambiguous: u64,
    oligos: u64,
    seq_index: u64,
}

impl<R: BufRead> SeqKmers<R> {
    pub fn new(coder: KmerCoder, rdr: R, soft_mask: bool) -> Self {
        Self {
            rdr,
            gen: KmerGen::new(coder),
            line: String::new(),
            ix: 0,
            descrip: String::new(),
            soft_mask,
            sequences: 0,
            all_bases: 0,
            unambiguous: 0,
            oligos: 0,
            seq_index: 0,
        }
    }

    /// Scan forward to the next base, header or end of input. Characters
    /// below 'A' other than `>` and `#` are treated as blanks; `#` discards
    /// the rest of its line. Letters count as sequence bases even when
    /// ambiguous.
    fn next_base(&mut self) -> anyhow::Result<Scan> {
        loop {
            let c = match self.line.as_bytes().get(self.ix) {
                Some(&c) => c,
                None => {
                    self.line.clear();
                    if self.rdr.read_line(&mut self.line)? == 0 {
                        return Ok(Scan::Eof);
                    }
                    self.ix = 0;
                    continue;
                }
            };
            if c < b'A' {
                if c == b'>' {
                    self.sequences += 1;
                    self.descrip = self.line.trim_end().to_owned();
                    self.seq_index = 0;
                    self.line.clear();
                    self.ix = 0;
                    return Ok(Scan::NewSeq);
                }
                if c == b'#' {
                    self.line.clear();
                    self.ix = 0;
                    continue;
                }
                self.ix += 1;
                continue;
            }
            self.all_bases += 1;
            self.seq_index += 1;
            self.ix += 1;
            return Ok(match c {
                b'a' | b'c' | b'g' | b't' if self.soft_mask => Scan::Ambiguous,
                b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't' => {
                    self.unambiguous += 1;
                    Scan::Base(c)
                }
                _ => Scan::Ambiguous,
            });
        }
    }

    /// Advance to the next complete k-mer window or sequence boundary;
    /// `None` at end of input.
    pub fn next_pos(&mut self) -> anyhow::Result<Option<SeqEvent>> {
        loop {
            match self.next_base()? {
                Scan::Base(c) => {
                    if self.gen.advance(encode_base(c)) {
                        self.oligos += 1;
                        return Ok(Some(SeqEvent::Kmer {
                            end_pos: self.seq_index,
                        }));
                    }
                }
                Scan::Ambiguous => self.gen.clear(),
                Scan::NewSeq => {
                    self.gen.clear();
                    return Ok(Some(SeqEvent::NewSeq));
                }
                Scan::Eof => {
                    self.gen.clear();
                    return Ok(None);
                }
            }
        }
    }

    #[inline]
    pub fn gen(&self) -> &KmerGen {
        &self.gen
    }

    /// Description line of the current sequence, including the `>`.
    #[inline]
    pub fn descrip(&self) -> &str {
        &self.descrip
    }

    /// 1-based start position of the current window.
    #[inline]
    pub fn oligo_start(&self) -> u64 {
        self.seq_index + 1 - self.gen.coder().length() as u64
    }

    #[inline]
    pub fn seq_count(&self) -> u64 {
        self.sequences
    }

    #[inline]
    pub fn base_count(&self) -> u64 {
        self.all_bases
    }

    #[inline]
    pub fn unambiguous_count(&self) -> u64 {
        self.unambiguous
    }

    #[inline]
    pub fn oligo_count(&self) -> u64 {
        self.oligos
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;
    #[allow(unused_imports)]
    use std::io::BufReader;

    #[allow(dead_code)]
    fn kmers_of(s: &str, k: usize, soft: bool) -> (Vec<(u64, String)>, u64, u64, u64) {
        let coder = KmerCoder::new(k).unwrap();
        let b = BufReader::new(s.as_bytes());
        let mut sk = SeqKmers::new(coder, b, soft);
        let mut out = Vec::new();
        while let Some(ev) = sk.next_pos().unwrap() {
            if let SeqEvent::Kmer { end_pos } = ev {
                out.push((end_pos, coder.to_bases(sk.gen().fwd())));
            }
        }
        (out, sk.base_count(), sk.unambiguous_count(), sk.seq_count())
    }

    #[test]
    fn windows_and_positions() {
        let s = ">seq1\nACGTA\nCG\n";
        let (got, bases, unamb, seqs) = kmers_of(s, 4, false);
        let exp = [
            (4, "ACGT"),
            (5, "CGTA"),
            (6, "GTAC"),
            (7, "TACG"),
        ];
        assert_eq!(got.len(), exp.len());
        for ((pos, w), (e_pos, e_w)) in got.iter().zip(exp) {
            assert_eq!((*pos, w.as_str()), (e_pos, e_w));
        }
        assert_eq!((bases, unamb, seqs), (7, 7, 1));
    }

    #[test]
    fn ambiguous_bases_break_windows() {
        let s = ">s\nACGTNACGT\n";
        let (got, bases, unamb, _) = kmers_of(s, 4, false);
        // N consumes a position and restarts the window
        assert_eq!(
            got,
            [(4, "ACGT".to_owned()), (9, "ACGT".to_owned())]
        );
        assert_eq!((bases, unamb), (9, 8));
    }

    #[test]
    fn soft_masking_gates_lowercase() {
        let s = ">s\nACgtACGT\n";
        // unmasked: lowercase is ordinary sequence
        let (got, _, unamb, _) = kmers_of(s, 4, false);
        assert_eq!(got.len(), 5);
        assert_eq!(unamb, 8);
        // masked: lowercase breaks windows like N
        let (got, _, unamb, _) = kmers_of(s, 4, true);
        assert_eq!(got, [(8, "ACGT".to_owned())]);
        assert_eq!(unamb, 6);
    }

    #[test]
    fn multiple_sequences_and_comments() {
        let s = "# leading comment\n>first seq\nACG\nT\n>second\nTTTT\nGG\n";
        let coder = KmerCoder::new(4).unwrap();
        let mut sk = SeqKmers::new(coder, BufReader::new(s.as_bytes()), false);
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::NewSeq));
        assert_eq!(sk.descrip(), ">first seq");
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::Kmer { end_pos: 4 }));
        assert_eq!(sk.oligo_start(), 1);
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::NewSeq));
        assert_eq!(sk.descrip(), ">second");
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::Kmer { end_pos: 4 }));
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::Kmer { end_pos: 5 }));
        assert_eq!(sk.next_pos().unwrap(), Some(SeqEvent::Kmer { end_pos: 6 }));
        assert_eq!(sk.next_pos().unwrap(), None);
        assert_eq!(sk.seq_count(), 2);
        assert_eq!(sk.oligo_count(), 4);
    }
}
