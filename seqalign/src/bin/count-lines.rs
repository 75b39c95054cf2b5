//! Pass-through filter that exposes alignment progress to pollers.
//!
//! Copies stdin to stdout and keeps the number of lines seen so far in the
//! counter file given on the command line.

use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use seqalign::progress::copy_counting;

const DEFAULT_EVERY: u64 = 10_000;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut counter: Option<PathBuf> = None;
    let mut every = DEFAULT_EVERY;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--every" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow::anyhow!("--every requires a value"))?;
            every = value
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid --every value: {value}"))?;
        } else if counter.is_none() {
            counter = Some(PathBuf::from(arg));
        } else {
            anyhow::bail!("unexpected argument: {arg}");
        }
    }

    let counter = counter.ok_or_else(|| anyhow::anyhow!("missing counter file argument"))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let input = BufReader::with_capacity(64 * 1024, stdin.lock());
    let output = BufWriter::with_capacity(64 * 1024, stdout.lock());

    copy_counting(input, output, &counter, every)?;
    Ok(())
}

fn print_help() {
    println!("count-lines - copy stdin to stdout while counting lines");
    println!();
    println!("Usage:");
    println!("  count-lines <counter-file> [--every <lines>]");
    println!();
    println!("The running count is written to <counter-file> every <lines> lines");
    println!("(default {DEFAULT_EVERY}) and once more when input ends.");
}
