//! Pull-parser oracle: parses the raster command byte stream the
//! [`crate::sequencer`] emits back into a typed event sequence.
//!
//! Parsing is kept separate from display: events are produced here and
//! handed to [`crate::render`] for formatting.

use crate::error::DecoderError;
use crate::rle;

/// `ESC i a <n>` dynamic-command-mode selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    EscP,
    Raster,
    PTemplate,
    Unknown(u8),
}

impl ModeKind {
    fn from_byte(b: u8) -> Self {
        match b {
            0 => ModeKind::EscP,
            1 => ModeKind::Raster,
            3 => ModeKind::PTemplate,
            other => ModeKind::Unknown(other),
        }
    }
}

/// Bare `M <n>` compression selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Tiff,
    Invalid(u8),
}

impl CompressionKind {
    fn from_byte(b: u8) -> Self {
        match b {
            0 => CompressionKind::None,
            2 => CompressionKind::Tiff,
            other => CompressionKind::Invalid(other),
        }
    }
}

/// One parsed command from the wire stream.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeEvent {
    /// A run of `n` recovery-padding zero bytes.
    Reset(usize),
    Initialize,
    SwitchStatusNotification(bool),
    StatusRequest,
    SwitchMode(ModeKind),
    PrintInformation {
        valid: u8,
        kind: u8,
        width: u8,
        length: u8,
        lines: u32,
        which_page: u8,
    },
    VariousMode {
        flags: u8,
    },
    AdvancedMode {
        flags: u8,
    },
    Margin(u16),
    CutEvery(u8),
    SelectCompression(CompressionKind),
    /// `ESC i R <mode>`: legacy transfer-mode select.
    LegacyTransferMode(u8),
    /// `ESC i c`: legacy hires page geometry.
    LegacyHiRes { width_mm: u8, hires: bool },
    /// `ESC * ' <lines_lo> <lines_hi>`: bit-image page header. The wire
    /// format carries no row width, so raw rows are only drained
    /// automatically into `RasterLine` events when the decoder has been
    /// primed with one via [`Decoder::with_bit_image_width`].
    BitImageHeader { lines: u32 },
    RasterLine {
        bytes: Vec<u8>,
        compression: CompressionKind,
        decoded_width: usize,
    },
    ZeroRasterLine,
    Print,
    EndOfJob,
    Error(DecoderError),
}

/// A pull parser over a complete command stream. Loads the whole stream into
/// memory up front rather than reading byte-at-a-time — this is a
/// diagnostic tool, not the hot path.
pub struct Decoder {
    data: Vec<u8>,
    pos: usize,
    compression: CompressionKind,
    /// Row width to use when slicing bit-image mode's raw, unframed rows
    /// back into `RasterLine`s. Not carried on the wire; only set when the
    /// caller already knows the job's `bytes_per_line` and primes it via
    /// [`Decoder::with_bit_image_width`].
    bit_image_width: Option<usize>,
    /// Raw rows still to be drained before resuming normal tag dispatch.
    /// Re-armed by the page header and by each flush's print-information
    /// event (which reports that flush's own batch size).
    bit_image_rows_pending: u32,
}

impl Decoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            compression: CompressionKind::None,
            bit_image_width: None,
            bit_image_rows_pending: 0,
        }
    }

    /// Like [`Decoder::new`], but primed with the row width (in bytes) to
    /// use for draining raw bit-image rows, since `ESC * '` declares only a
    /// line count and not a width.
    pub fn with_bit_image_width(data: Vec<u8>, bytes_per_line: usize) -> Self {
        let mut dec = Self::new(data);
        dec.bit_image_width = Some(bytes_per_line);
        dec
    }

    pub fn from_reader(mut reader: impl std::io::Read) -> std::io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn error_at(&mut self, reason: impl Into<String>, skip: usize) -> DecodeEvent {
        let offset = self.pos;
        self.pos = (self.pos + skip.max(1)).min(self.data.len());
        DecodeEvent::Error(DecoderError {
            offset,
            reason: reason.into(),
        })
    }

    fn need(&mut self, n: usize, what: &str) -> Result<(), DecodeEvent> {
        if self.remaining() < n {
            let rem = self.remaining();
            Err(self.error_at(format!("truncated {what}: need {n} bytes, have {rem}"), rem))
        } else {
            Ok(())
        }
    }

    fn decode_esc_i(&mut self) -> DecodeEvent {
        // pos is positioned just past `ESC i`.
        if let Err(e) = self.need(1, "ESC i <cmd>") {
            return e;
        }
        let cmd = self.data[self.pos];
        match cmd {
            b'S' => {
                self.pos += 1;
                DecodeEvent::StatusRequest
            }
            b'!' => {
                if let Err(e) = self.need(2, "ESC i !") {
                    return e;
                }
                let n = self.data[self.pos + 1];
                self.pos += 2;
                DecodeEvent::SwitchStatusNotification(n != 0)
            }
            b'a' => {
                if let Err(e) = self.need(2, "ESC i a") {
                    return e;
                }
                let mode = ModeKind::from_byte(self.data[self.pos + 1]);
                self.pos += 2;
                DecodeEvent::SwitchMode(mode)
            }
            b'z' => {
                // `self.pos` points at the 'z' command byte itself; the 10
                // data bytes (valid, kind, width, length, lines[4],
                // which_page, reserved) follow it.
                if let Err(e) = self.need(11, "ESC i z") {
                    return e;
                }
                let b = &self.data[self.pos + 1..self.pos + 11];
                let valid = b[0];
                let kind = b[1];
                let width = b[2];
                let length = b[3];
                let lines = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
                let which_page = b[8];
                self.pos += 11;
                if self.bit_image_width.is_some() {
                    self.bit_image_rows_pending = lines;
                }
                DecodeEvent::PrintInformation {
                    valid,
                    kind,
                    width,
                    length,
                    lines,
                    which_page,
                }
            }
            b'M' => {
                if let Err(e) = self.need(2, "ESC i M") {
                    return e;
                }
                let flags = self.data[self.pos + 1];
                self.pos += 2;
                DecodeEvent::VariousMode { flags }
            }
            b'K' => {
                if let Err(e) = self.need(2, "ESC i K") {
                    return e;
                }
                let flags = self.data[self.pos + 1];
                self.pos += 2;
                DecodeEvent::AdvancedMode { flags }
            }
            b'd' => {
                if let Err(e) = self.need(3, "ESC i d") {
                    return e;
                }
                let lo = self.data[self.pos + 1];
                let hi = self.data[self.pos + 2];
                self.pos += 3;
                DecodeEvent::Margin(u16::from_le_bytes([lo, hi]))
            }
            b'A' => {
                if let Err(e) = self.need(2, "ESC i A") {
                    return e;
                }
                let n = self.data[self.pos + 1];
                self.pos += 2;
                DecodeEvent::CutEvery(n)
            }
            b'R' => {
                if let Err(e) = self.need(2, "ESC i R") {
                    return e;
                }
                let mode = self.data[self.pos + 1];
                self.pos += 2;
                DecodeEvent::LegacyTransferMode(mode)
            }
            b'c' => {
                if let Err(e) = self.need(6, "ESC i c") {
                    return e;
                }
                let width_mm = self.data[self.pos + 3];
                let hires = self.data[self.pos + 5] != 0;
                self.pos += 6;
                DecodeEvent::LegacyHiRes { width_mm, hires }
            }
            other => self.error_at(format!("unrecognized ESC i command 0x{other:02x}"), 1),
        }
    }

    fn decode_raster_line(&mut self, tag: u8) -> DecodeEvent {
        if let Err(e) = self.need(2, "raster line length prefix") {
            return e;
        }
        let b0 = self.data[self.pos];
        let b1 = self.data[self.pos + 1];
        let len = if tag == b'G' {
            u16::from_le_bytes([b0, b1])
        } else {
            u16::from_be_bytes([b0, b1])
        } as usize;
        self.pos += 2;
        if let Err(e) = self.need(len, "raster line body") {
            return e;
        }
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        let decoded_width = match self.compression {
            CompressionKind::Tiff => rle::decoded_len(&bytes),
            CompressionKind::None | CompressionKind::Invalid(_) => bytes.len(),
        };
        DecodeEvent::RasterLine {
            bytes,
            compression: self.compression,
            decoded_width,
        }
    }
}

impl Iterator for Decoder {
    type Item = DecodeEvent;

    fn next(&mut self) -> Option<DecodeEvent> {
        if self.bit_image_rows_pending > 0 {
            let width = self.bit_image_width.unwrap_or(0);
            if let Err(e) = self.need(width, "bit-image row") {
                self.bit_image_rows_pending = 0;
                return Some(e);
            }
            let bytes = self.data[self.pos..self.pos + width].to_vec();
            self.pos += width;
            self.bit_image_rows_pending -= 1;
            return Some(DecodeEvent::RasterLine {
                bytes,
                compression: CompressionKind::None,
                decoded_width: width,
            });
        }

        if self.pos >= self.data.len() {
            return None;
        }
        let b = self.data[self.pos];

        Some(match b {
            0x00 => {
                let start = self.pos;
                while self.pos < self.data.len() && self.data[self.pos] == 0x00 {
                    self.pos += 1;
                }
                DecodeEvent::Reset(self.pos - start)
            }
            0x1B => {
                if let Err(e) = self.need(2, "ESC <cmd>") {
                    return Some(e);
                }
                match self.data[self.pos + 1] {
                    b'@' => {
                        self.pos += 2;
                        self.compression = CompressionKind::None;
                        DecodeEvent::Initialize
                    }
                    b'i' => {
                        self.pos += 2;
                        self.decode_esc_i()
                    }
                    b'*' => {
                        if self.remaining() < 5 || self.data[self.pos + 2] != b'\'' {
                            return Some(self.error_at("unrecognized ESC * sequence", 2));
                        }
                        let lines =
                            u16::from_le_bytes([self.data[self.pos + 3], self.data[self.pos + 4]]) as u32;
                        self.pos += 5;
                        if self.bit_image_width.is_some() {
                            self.bit_image_rows_pending = lines;
                        }
                        DecodeEvent::BitImageHeader { lines }
                    }
                    other => self.error_at(format!("unrecognized ESC command 0x{other:02x}"), 2),
                }
            }
            b'G' | b'g' => self.decode_raster_line(b),
            b'Z' => {
                self.pos += 1;
                DecodeEvent::ZeroRasterLine
            }
            b'M' => {
                if let Err(e) = self.need(2, "compression select") {
                    return Some(e);
                }
                let kind = CompressionKind::from_byte(self.data[self.pos + 1]);
                self.compression = kind;
                self.pos += 2;
                DecodeEvent::SelectCompression(kind)
            }
            0x0C => {
                self.pos += 1;
                DecodeEvent::Print
            }
            0x1A => {
                self.pos += 1;
                DecodeEvent::EndOfJob
            }
            other => self.error_at(format!("unrecognized byte 0x{other:02x}"), 1),
        })
    }
}
