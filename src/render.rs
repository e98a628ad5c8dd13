//! Formats a [`crate::decoder::DecodeEvent`] stream as human-readable text.
//!
//! Kept separate from [`crate::decoder`] so the event enum stays free of any
//! display concern.

use std::fmt::Write as _;

use crate::decoder::{CompressionKind, DecodeEvent, ModeKind};

/// When to emit ANSI color codes around a rendered line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

impl ColorChoice {
    fn enabled(self, is_tty: bool) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_tty,
        }
    }
}

/// How much detail to print per event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress per-row raster line noise (`RasterLine`/`ZeroRasterLine`).
    Silent,
    /// One line per event, including raster lines.
    Normal,
    /// Normal, plus the raw byte count and compression kind per raster line.
    Verbose,
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";

fn paint(color: &str, text: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Render one event as a line of text, or `None` if `verbosity` suppresses it.
pub fn render_event(
    event: &DecodeEvent,
    verbosity: Verbosity,
    color: ColorChoice,
    is_tty: bool,
) -> Option<String> {
    let c = color.enabled(is_tty);
    if verbosity == Verbosity::Silent
        && matches!(event, DecodeEvent::RasterLine { .. } | DecodeEvent::ZeroRasterLine)
    {
        return None;
    }

    let mut out = String::new();
    match event {
        DecodeEvent::Reset(n) => {
            write!(out, "{} ({n} bytes)", paint(DIM, "reset", c)).unwrap();
        }
        DecodeEvent::Initialize => {
            write!(out, "{}", paint(BOLD, "initialize", c)).unwrap();
        }
        DecodeEvent::SwitchStatusNotification(on) => {
            write!(out, "status-notification {}", if *on { "on" } else { "off" }).unwrap();
        }
        DecodeEvent::StatusRequest => {
            write!(out, "status-request").unwrap();
        }
        DecodeEvent::SwitchMode(mode) => {
            let name = match mode {
                ModeKind::EscP => "esc/p".to_string(),
                ModeKind::Raster => "raster".to_string(),
                ModeKind::PTemplate => "p-template".to_string(),
                ModeKind::Unknown(b) => format!("unknown(0x{b:02x})"),
            };
            write!(out, "switch-mode {name}").unwrap();
        }
        DecodeEvent::PrintInformation {
            valid,
            kind,
            width,
            length,
            lines,
            which_page,
        } => {
            write!(
                out,
                "{} valid=0x{valid:02x} kind={kind} width={width}mm length={length}mm lines={lines} page={which_page}",
                paint(CYAN, "print-information", c)
            )
            .unwrap();
        }
        DecodeEvent::VariousMode { flags } => {
            write!(out, "various-mode flags=0x{flags:02x}").unwrap();
        }
        DecodeEvent::AdvancedMode { flags } => {
            write!(out, "advanced-mode flags=0x{flags:02x}").unwrap();
        }
        DecodeEvent::Margin(lines) => {
            write!(out, "margin {lines} lines").unwrap();
        }
        DecodeEvent::CutEvery(n) => {
            write!(out, "cut-every {n}").unwrap();
        }
        DecodeEvent::SelectCompression(kind) => {
            let name = match kind {
                CompressionKind::None => "none",
                CompressionKind::Tiff => "tiff",
                CompressionKind::Invalid(_) => "invalid",
            };
            write!(out, "select-compression {name}").unwrap();
        }
        DecodeEvent::LegacyTransferMode(mode) => {
            write!(out, "legacy-transfer-mode 0x{mode:02x}").unwrap();
        }
        DecodeEvent::LegacyHiRes { width_mm, hires } => {
            write!(out, "legacy-hires width={width_mm}mm hires={hires}").unwrap();
        }
        DecodeEvent::BitImageHeader { lines } => {
            write!(out, "{} lines={lines}", paint(CYAN, "bit-image-header", c)).unwrap();
        }
        DecodeEvent::RasterLine {
            bytes,
            compression,
            decoded_width,
        } => {
            if verbosity == Verbosity::Verbose {
                write!(
                    out,
                    "raster-line {} bytes on the wire, {decoded_width} decoded, compression={compression:?}",
                    bytes.len()
                )
                .unwrap();
            } else {
                write!(out, "raster-line {decoded_width} px").unwrap();
            }
        }
        DecodeEvent::ZeroRasterLine => {
            write!(out, "{}", paint(DIM, "zero-raster-line", c)).unwrap();
        }
        DecodeEvent::Print => {
            write!(out, "{}", paint(GREEN, "print (form feed)", c)).unwrap();
        }
        DecodeEvent::EndOfJob => {
            write!(out, "{}", paint(BOLD, "end-of-job (eject)", c)).unwrap();
        }
        DecodeEvent::Error(e) => {
            write!(
                out,
                "{} at offset {}: {}",
                paint(RED, "error", c),
                e.offset,
                e.reason
            )
            .unwrap();
        }
    }
    if matches!(event, DecodeEvent::Error(_)) {
        return Some(paint(YELLOW, &out, c));
    }
    Some(out)
}
