use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::ArgMatches;

use crate::utils::get_prime;

mod cli_model;

pub struct CountOpts {
    pub oligo_len: usize,
    pub hash_size: usize,
    pub slicing: u64,
    pub slice: u64,
    pub soft_mask: bool,
    pub min_report: u64,
    pub prefix: String,
    pub files: Vec<String>,
}

pub struct PairOpts {
    pub oligo_len: usize,
    /// Deduced from the input's `#distinct:` settings comment when absent.
    pub hash_size: Option<usize>,
    pub filter_count: u64,
    pub table: Option<PathBuf>,
}

pub struct EdgesOpts {
    pub oligo_len: usize,
    pub hash_size: usize,
    pub slicing: u64,
    pub slice: u64,
    pub table: PathBuf,
    /// `positions[p]` is true when SNP position `p` is accepted.
    pub positions: Vec<bool>,
    pub ambiguous: bool,
    pub min_count: u64,
    pub max_count: u64,
    pub soft_mask: bool,
    pub edge_file: Option<PathBuf>,
    pub files: Vec<String>,
}

pub struct ScanOpts {
    pub oligo_len: usize,
    pub hash_size: usize,
    pub slicing: u64,
    pub slice: u64,
    pub table: PathBuf,
    pub positions: Vec<bool>,
    pub ambiguous: bool,
    pub max_count: u64,
    pub summary: bool,
    pub soft_mask: bool,
    pub files: Vec<String>,
}

pub struct LinkOpts {
    pub oligo_len: usize,
    pub hash_size: usize,
    pub contigs: PathBuf,
    pub files: Vec<String>,
}

pub enum Task {
    Count(CountOpts),
    Pair(PairOpts),
    Edges(EdgesOpts),
    Scan(ScanOpts),
    Link(LinkOpts),
}

pub struct Config {
    date: DateTime<Local>,
    task: Task,
}

impl Config {
    pub fn date(&self) -> &DateTime<Local> {
        &self.date
    }

    pub fn task(&self) -> &Task {
        &self.task
    }
}

/// Split `SLICING[:SLICE]`; the larger number is the slicing factor, and a
/// missing slice defaults to 0. The factor is reduced to a prime.
fn parse_slicing(s: &str) -> anyhow::Result<(u64, u64)> {
    let mut vals = [0u64; 2];
    for (i, tok) in s.splitn(2, ':').enumerate() {
        vals[i] = tok
            .trim()
            .parse()
            .with_context(|| format!("bad slicing specification '{s}'"))?;
    }
    let (mut slicing, slice) = if vals[1] > vals[0] {
        (vals[1], vals[0])
    } else {
        (vals[0], vals[1])
    };
    if slicing == 0 {
        return Err(anyhow!("slicing factor must be at least 1"));
    }
    if slicing > 1 {
        slicing = get_prime(slicing);
    }
    Ok((slicing, slice))
}

/// Comma-separated SNP positions in `1..=k`, or `*` for all of them.
fn parse_positions(s: &str, k: usize) -> anyhow::Result<Vec<bool>> {
    let mut use_pos = vec![false; k + 1];
    if s.starts_with('*') {
        use_pos[1..].fill(true);
        return Ok(use_pos);
    }
    for tok in s.split(',') {
        let n: usize = tok
            .trim()
            .parse()
            .with_context(|| format!("bad SNP position list '{s}'"))?;
        if n == 0 || n > k {
            return Err(anyhow!("SNP position {n} outside 1..={k}"));
        }
        use_pos[n] = true;
    }
    Ok(use_pos)
}

fn oligo_len(m: &ArgMatches) -> usize {
    *m.get_one::<u64>("oligo_len")
        .expect("Missing default argument") as usize
}

fn hash_size(m: &ArgMatches) -> Option<usize> {
    m.get_one::<u64>("hash_size").map(|&n| {
        let p = get_prime(n);
        if p < n {
            warn!("Hash size {n} reduced to prime number {p}");
        }
        p as usize
    })
}

fn slicing(m: &ArgMatches) -> anyhow::Result<(u64, u64)> {
    parse_slicing(
        m.get_one::<String>("slicing")
            .expect("Missing default argument"),
    )
}

fn positions(m: &ArgMatches, k: usize) -> anyhow::Result<Vec<bool>> {
    parse_positions(
        m.get_one::<String>("positions")
            .expect("Missing default argument"),
        k,
    )
}

fn files(m: &ArgMatches) -> Vec<String> {
    m.get_many::<String>("files")
        .expect("Missing required argument")
        .cloned()
        .collect()
}

pub fn handle_cli() -> anyhow::Result<Config> {
    let c = cli_model::cli_model();
    let m = c.get_matches();
    super::utils::init_log(&m);

    let task = match m.subcommand() {
        Some(("count", m)) => {
            let (slicing, slice) = slicing(m)?;
            Task::Count(CountOpts {
                oligo_len: oligo_len(m),
                hash_size: hash_size(m).unwrap_or_else(|| get_prime(99999) as usize),
                slicing,
                slice,
                soft_mask: m.get_flag("soft_mask"),
                min_report: *m
                    .get_one::<u64>("min_count")
                    .expect("Missing default argument"),
                prefix: m
                    .get_one::<String>("prefix")
                    .expect("Missing default argument")
                    .to_owned(),
                files: files(m),
            })
        }
        Some(("pair", m)) => Task::Pair(PairOpts {
            oligo_len: oligo_len(m),
            hash_size: hash_size(m),
            filter_count: *m
                .get_one::<u64>("filter_count")
                .expect("Missing default argument"),
            table: m.get_one::<PathBuf>("table").map(|p| p.to_owned()),
        }),
        Some(("edges", m)) => {
            let k = oligo_len(m);
            let (slicing, slice) = slicing(m)?;
            Task::Edges(EdgesOpts {
                oligo_len: k,
                hash_size: hash_size(m).expect("Missing required argument"),
                slicing,
                slice,
                table: m
                    .get_one::<PathBuf>("table")
                    .expect("Missing required argument")
                    .to_owned(),
                positions: positions(m, k)?,
                ambiguous: m.get_flag("ambiguous"),
                min_count: *m
                    .get_one::<u64>("min_count")
                    .expect("Missing default argument"),
                max_count: *m
                    .get_one::<u64>("max_count")
                    .expect("Missing default argument"),
                soft_mask: m.get_flag("soft_mask"),
                edge_file: m.get_one::<PathBuf>("edge_file").map(|p| p.to_owned()),
                files: files(m),
            })
        }
        Some(("scan", m)) => {
            let k = oligo_len(m);
            let (slicing, slice) = slicing(m)?;
            Task::Scan(ScanOpts {
                oligo_len: k,
                hash_size: hash_size(m).expect("Missing required argument"),
                slicing,
                slice,
                table: m
                    .get_one::<PathBuf>("table")
                    .expect("Missing required argument")
                    .to_owned(),
                positions: positions(m, k)?,
                ambiguous: m.get_flag("ambiguous"),
                max_count: m.get_one::<u64>("max_count").copied().unwrap_or(u64::MAX),
                summary: m.get_flag("summary"),
                soft_mask: m.get_flag("soft_mask"),
                files: files(m),
            })
        }
        Some(("link", m)) => Task::Link(LinkOpts {
            oligo_len: oligo_len(m),
            hash_size: hash_size(m).expect("Missing required argument"),
            contigs: m
                .get_one::<PathBuf>("contigs")
                .expect("Missing required argument")
                .to_owned(),
            files: files(m),
        }),
        _ => return Err(anyhow!("Missing subcommand")),
    };

    Ok(Config {
        date: Local::now(),
        task,
    })
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn slicing_takes_larger_as_factor() {
        assert_eq!(parse_slicing("11:0").unwrap(), (11, 0));
        assert_eq!(parse_slicing("5:13").unwrap(), (13, 5));
        assert_eq!(parse_slicing("17").unwrap(), (17, 0));
        // non-prime factors are reduced
        assert_eq!(parse_slicing("12:3").unwrap(), (11, 3));
        assert!(parse_slicing("0").is_err());
        assert!(parse_slicing("a:b").is_err());
    }

    #[test]
    fn position_lists() {
        let p = parse_positions("3,12,21", 23).unwrap();
        assert_eq!(p.iter().filter(|&&b| b).count(), 3);
        assert!(p[3] && p[12] && p[21]);
        let p = parse_positions("*", 23).unwrap();
        assert!(!p[0]);
        assert_eq!(p.iter().filter(|&&b| b).count(), 23);
        assert!(parse_positions("0", 23).is_err());
        assert!(parse_positions("24", 23).is_err());
    }
}
