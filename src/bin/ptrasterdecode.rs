//! `ptrasterdecode` — parses a Brother P-touch/QL device command stream back
//! into a human-readable event log, and optionally dumps each decoded page's
//! raster to a 1-bit indexed PNG.

use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ptouch_raster::decoder::{DecodeEvent, Decoder};
use ptouch_raster::render::{self, ColorChoice, Verbosity};
use ptouch_raster::rle;

/// Parse a Brother raster command stream into a readable event log.
#[derive(Parser, Debug)]
#[command(name = "ptrasterdecode", version, about)]
struct Cli {
    /// Device command stream to decode. Defaults to stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Dump each decoded page's raster to `PREFIX-<n>.png`.
    #[arg(long)]
    write: Option<String>,

    /// Suppress per-row raster-line events.
    #[arg(long, conflicts_with = "verbose")]
    silent: bool,

    /// Show wire byte counts and compression kind for every raster line.
    #[arg(long)]
    verbose: bool,

    /// When to colorize output.
    #[arg(long, value_enum, default_value = "auto")]
    color: CliColor,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliColor {
    Always,
    Auto,
    Never,
}

impl From<CliColor> for ColorChoice {
    fn from(c: CliColor) -> Self {
        match c {
            CliColor::Always => ColorChoice::Always,
            CliColor::Auto => ColorChoice::Auto,
            CliColor::Never => ColorChoice::Never,
        }
    }
}

/// Accumulates decoded rows for the page currently being written, so a
/// `--write` dump can be flushed to an indexed PNG on `Print`/`EndOfJob`.
/// Bit 1 (set) renders as black, matching an inked pixel on the tape.
struct PageDump {
    prefix: String,
    page_index: u32,
    width_bits: usize,
    rows: Vec<Vec<u8>>,
}

impl PageDump {
    fn new(prefix: String) -> Self {
        Self {
            prefix,
            page_index: 0,
            width_bits: 0,
            rows: Vec::new(),
        }
    }

    fn push_row(&mut self, decoded: &[u8]) {
        self.width_bits = self.width_bits.max(decoded.len() * 8);
        self.rows.push(decoded.to_vec());
    }

    fn flush_page(&mut self) -> io::Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        self.page_index += 1;
        let path = format!("{}-{}.png", self.prefix, self.page_index);
        let f = File::create(&path)?;

        let mut encoder = png::Encoder::new(f, self.width_bits as u32, self.rows.len() as u32);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::One);
        // Palette index 0 = white (background), index 1 = black (ink). The
        // raster bit itself is already 1-for-ink, so no remapping is needed.
        encoder.set_palette(vec![0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00]);
        let mut writer = encoder
            .write_header()
            .map_err(|e| io::Error::other(e.to_string()))?;
        let mut data = Vec::with_capacity(self.rows.len() * self.rows[0].len());
        for row in &self.rows {
            data.extend_from_slice(row);
        }
        writer
            .write_image_data(&data)
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.rows.clear();
        Ok(())
    }
}

fn run(cli: &Cli) -> Result<(), ExitCode> {
    let mut input: Box<dyn Read> = match &cli.input {
        Some(p) => Box::new(File::open(p).map_err(|_| ExitCode::from(1))?),
        None => Box::new(io::stdin()),
    };
    let mut data = Vec::new();
    input
        .read_to_end(&mut data)
        .map_err(|_| ExitCode::from(1))?;

    let verbosity = if cli.silent {
        Verbosity::Silent
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    let color: ColorChoice = cli.color.into();
    let is_tty = io::stdout().is_terminal();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut dump = cli.write.as_ref().map(|p| PageDump::new(p.clone()));
    let mut row_width = 0usize;
    let mut saw_error = false;

    for event in Decoder::new(data) {
        if let Some(line) = render::render_event(&event, verbosity, color, is_tty) {
            let _ = writeln!(out, "{line}");
        }
        if matches!(event, DecodeEvent::Error(_)) {
            saw_error = true;
        }
        if let Some(dump) = dump.as_mut() {
            match &event {
                DecodeEvent::RasterLine {
                    bytes,
                    compression,
                    decoded_width,
                } => {
                    row_width = row_width.max(*decoded_width);
                    let mut decoded = vec![0u8; row_width.div_ceil(8).max(1)];
                    match compression {
                        ptouch_raster::decoder::CompressionKind::Tiff => {
                            rle::decode_into(bytes, &mut decoded);
                        }
                        _ => {
                            let n = bytes.len().min(decoded.len());
                            decoded[..n].copy_from_slice(&bytes[..n]);
                        }
                    }
                    dump.push_row(&decoded);
                }
                DecodeEvent::ZeroRasterLine => {
                    let width = row_width.div_ceil(8).max(1);
                    dump.push_row(&vec![0u8; width]);
                }
                DecodeEvent::Print | DecodeEvent::EndOfJob => {
                    if let Err(e) = dump.flush_page() {
                        eprintln!("failed to write page PNG: {e}");
                        saw_error = true;
                    }
                }
                _ => {}
            }
        }
    }
    if let Some(dump) = dump.as_mut() {
        if let Err(e) = dump.flush_page() {
            eprintln!("failed to write page PNG: {e}");
            saw_error = true;
        }
    }

    if saw_error {
        return Err(ExitCode::from(1));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
