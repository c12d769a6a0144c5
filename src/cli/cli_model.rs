use std::path::PathBuf;

use clap::{command, value_parser, Arg, ArgAction, Command};

use crate::utils::LogLevel;

fn oligo_len_arg() -> Arg {
    Arg::new("oligo_len")
        .short('o')
        .long("oligo-len")
        .value_parser(value_parser!(u64).range(1..=32))
        .value_name("INT")
        .default_value("23")
        .help("Length of k-mers (typically in 16..32)")
}

fn hash_size_arg() -> Arg {
    Arg::new("hash_size")
        .short('H')
        .long("hash-size")
        .value_parser(value_parser!(u64).range(1001..))
        .value_name("INT")
        .help("Number of cells in the k-mer index (reduced to a prime)")
}

fn slicing_arg() -> Arg {
    Arg::new("slicing")
        .short('S')
        .long("slicing")
        .value_parser(value_parser!(String))
        .value_name("SLICING[:SLICE]")
        .default_value("11:0")
        .help("Slicing factor and slice for unpartnered k-mers")
}

fn soft_mask_arg() -> Arg {
    Arg::new("soft_mask")
        .short('x')
        .long("soft-mask")
        .action(ArgAction::SetTrue)
        .help("Treat lowercase bases as masked")
}

fn table_arg() -> Arg {
    Arg::new("table")
        .short('i')
        .long("table")
        .value_parser(value_parser!(PathBuf))
        .value_name("FILE")
        .help("Input k-mer table [default: stdin]")
}

fn positions_arg() -> Arg {
    Arg::new("positions")
        .short('P')
        .long("positions")
        .value_parser(value_parser!(String))
        .value_name("POS[,POS]*")
        .default_value("3,12,21")
        .help("Accepted SNP positions within SNPmer pairs ('*' for all)")
}

fn ambiguous_arg() -> Arg {
    Arg::new("ambiguous")
        .short('a')
        .long("ambiguous")
        .action(ArgAction::SetTrue)
        .help("Also load ambiguously partnered k-mers")
}

fn min_count_arg() -> Arg {
    Arg::new("min_count")
        .short('m')
        .long("min-count")
        .value_parser(value_parser!(u64))
        .value_name("INT")
        .default_value("2")
        .help("Minimum k-mer count")
}

fn files_arg(help: &'static str) -> Arg {
    Arg::new("files")
        .value_parser(value_parser!(String))
        .value_name("FILE|/")
        .num_args(1..)
        .required(true)
        .help(help)
}

pub(super) fn cli_model() -> Command {
    command!()
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .global(true)
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("info")
                .global(true)
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .global(true)
                .help("Silence all output"),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("count")
                .about("Count k-mers in sequence sets, dump counts and presence bitmaps")
                .arg(oligo_len_arg())
                .arg(hash_size_arg())
                .arg(slicing_arg())
                .arg(soft_mask_arg())
                .arg(min_count_arg().help("Minimum count for a k-mer to be dumped"))
                .arg(
                    Arg::new("prefix")
                        .short('p')
                        .long("prefix")
                        .value_parser(value_parser!(String))
                        .value_name("PREFIX")
                        .default_value("snpmer_count")
                        .help("Set prefix for the JSON summary file"),
                )
                .arg(files_arg(
                    "FASTA files; a '/' token separates sequence sets",
                )),
        )
        .subcommand(
            Command::new("pair")
                .about("Resolve allelic partners over a counted k-mer table")
                .arg(oligo_len_arg())
                .arg(hash_size_arg())
                .arg(
                    Arg::new("filter_count")
                        .short('f')
                        .long("filter-count")
                        .value_parser(value_parser!(u64))
                        .value_name("INT")
                        .default_value("254")
                        .help("Skip k-mers with count above this"),
                )
                .arg(table_arg()),
        )
        .subcommand(
            Command::new("edges")
                .about("Stream reads against a SNPmer table and build a linkage graph")
                .arg(oligo_len_arg())
                .arg(hash_size_arg().required(true))
                .arg(slicing_arg())
                .arg(table_arg().required(true))
                .arg(positions_arg())
                .arg(ambiguous_arg())
                .arg(min_count_arg())
                .arg(
                    Arg::new("max_count")
                        .short('M')
                        .long("max-count")
                        .value_parser(value_parser!(u64))
                        .value_name("INT")
                        .default_value("50")
                        .help("Maximum k-mer count (pair sum for SNPmer pairs)"),
                )
                .arg(soft_mask_arg())
                .arg(
                    Arg::new("edge_file")
                        .short('e')
                        .long("edge-file")
                        .value_parser(value_parser!(PathBuf))
                        .value_name("FILE")
                        .help("Dump edges to this file instead of printing statistics"),
                )
                .arg(files_arg(
                    "FASTA read files; a '/' token separates sequence sets",
                )),
        )
        .subcommand(
            Command::new("scan")
                .about("Report table hits position by position along reads")
                .arg(oligo_len_arg())
                .arg(hash_size_arg().required(true))
                .arg(slicing_arg())
                .arg(table_arg().required(true))
                .arg(positions_arg())
                .arg(ambiguous_arg())
                .arg(
                    Arg::new("max_count")
                        .short('M')
                        .long("max-count")
                        .value_parser(value_parser!(u64))
                        .value_name("INT")
                        .help("Report unpartnered k-mers above this count as repetitive"),
                )
                .arg(
                    Arg::new("summary")
                        .short('s')
                        .long("summary")
                        .action(ArgAction::SetTrue)
                        .help("Print a per-position summary string for each read"),
                )
                .arg(soft_mask_arg())
                .arg(files_arg(
                    "FASTA read files; a '/' token separates sequence sets",
                )),
        )
        .subcommand(
            Command::new("link")
                .about("Cluster read k-mer hits against k-mer contigs by diagonal")
                .arg(oligo_len_arg())
                .arg(hash_size_arg().required(true))
                .arg(
                    Arg::new("contigs")
                        .short('c')
                        .long("contigs")
                        .value_parser(value_parser!(PathBuf))
                        .value_name("FILE")
                        .required(true)
                        .help("File with contigs as lists of k-mers or SNPmer pairs"),
                )
                .arg(files_arg(
                    "Read-kmer files; a '/' token separates read sets",
                )),
        )
}
