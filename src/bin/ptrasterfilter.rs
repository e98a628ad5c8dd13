//! `ptrasterfilter` — reads a raster page stream and writes the
//! corresponding Brother P-touch/QL device command stream.
//!
//! A single positional option string plus `--input`/`--output` path
//! overrides, built with `clap`'s derive API, even though this binary has
//! no subcommands of its own.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ptouch_raster::cancel::CancelToken;
use ptouch_raster::error::Error;
use ptouch_raster::options::JobOptions;
use ptouch_raster::reader::CupsStyleReader;
use ptouch_raster::sequencer::Sequencer;

/// Convert a page-by-page 1-bit raster stream into Brother raster commands.
#[derive(Parser, Debug)]
#[command(name = "ptrasterfilter", version, about)]
struct Cli {
    /// Whitespace-separated `key[=value]` job options (see JobOptions).
    options: String,

    /// Raster input path. Defaults to stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Device command output path. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_options(spec: &str) -> Result<JobOptions, ptouch_raster::error::ConfigError> {
    let mut options = JobOptions::default();
    for token in spec.split_whitespace() {
        options.apply(token)?;
    }
    Ok(options)
}

fn open_input(path: Option<&PathBuf>) -> io::Result<Box<dyn Read>> {
    match path {
        Some(p) => Ok(Box::new(File::open(p)?)),
        None => Ok(Box::new(io::stdin())),
    }
}

fn open_output(path: Option<&PathBuf>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(p) => Ok(Box::new(BufWriter::new(File::create(p)?))),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn run(cli: &Cli) -> Result<(), ExitCode> {
    let options = parse_options(&cli.options).map_err(|e| {
        error!(%e, "rejected option string");
        ExitCode::from(2)
    })?;

    let mut input = open_input(cli.input.as_ref()).map_err(|e| {
        error!(%e, "failed to open input");
        ExitCode::from(1)
    })?;
    let output = open_output(cli.output.as_ref()).map_err(|e| {
        error!(%e, "failed to open output");
        ExitCode::from(1)
    })?;

    let mut reader = CupsStyleReader::new(&mut input);
    let sequencer = Sequencer::new(output, options, CancelToken::new());

    match sequencer.run(&mut reader) {
        Ok(mut sink) => {
            sink.flush().map_err(|e| {
                error!(%e, "failed to flush output");
                ExitCode::from(1)
            })?;
            info!("job finished");
            Ok(())
        }
        Err(Error::Config(e)) => {
            error!(%e, "configuration error");
            Err(ExitCode::from(2))
        }
        Err(e) => {
            error!(%e, "job failed");
            Err(ExitCode::from(1))
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
