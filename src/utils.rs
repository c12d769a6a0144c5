use std::{fmt, str::FromStr};

use clap::ArgMatches;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel {
    level: usize,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_lowercase().as_str() {
            "none" => 0,
            "error" => 1,
            "warn" => 2,
            "info" => 3,
            "debug" => 4,
            "trace" => 5,
            _ => return Err(format!("unknown log level '{s}'")),
        };
        Ok(Self { level })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = ["none", "error", "warn", "info", "debug", "trace"][self.level];
        write!(f, "{s}")
    }
}

impl LogLevel {
    pub fn is_none(&self) -> bool {
        self.level == 0
    }

    pub fn get_level(&self) -> usize {
        self.level.saturating_sub(1)
    }
}

pub fn init_log(m: &ArgMatches) {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .expect("Missing default argument");
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .expect("Missing default argument");

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .expect("Could not set up logging");
}

/// Largest prime not greater than `n`. Requested hash-table capacities are
/// reduced through this so the probing step is always coprime with the table
/// size. Trial division is plenty for a once-per-run call.
pub fn get_prime(n: u64) -> u64 {
    assert!(n >= 2, "no prime below {n}");
    let mut p = n;
    'outer: loop {
        if p == 2 {
            return p;
        }
        if p & 1 == 1 {
            let mut d = 3;
            while d * d <= p {
                if p % d == 0 {
                    p -= 1;
                    continue 'outer;
                }
                d += 2;
            }
            return p;
        }
        p -= 1;
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn log_levels_parse() {
        for (s, none, v) in [("none", true, 0), ("INFO", false, 2), ("trace", false, 4)] {
            let l: LogLevel = s.parse().unwrap();
            assert_eq!(l.is_none(), none);
            assert_eq!(l.get_level(), v);
        }
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn prime_reduction() {
        assert_eq!(get_prime(2), 2);
        assert_eq!(get_prime(10), 7);
        assert_eq!(get_prime(1009), 1009);
        assert_eq!(get_prime(1_000_000), 999_983);
    }
}
