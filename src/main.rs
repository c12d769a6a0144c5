#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

mod annot;
mod cells;
mod cli;
mod commands;
mod diag;
mod graph;
mod index;
mod kmers;
mod partner;
mod reader;
mod records;
mod utils;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli()?;
    commands::run(&cfg)
}
