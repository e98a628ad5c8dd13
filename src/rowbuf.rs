//! Streaming page-assembly buffer: accumulates tagged raster-line packets for
//! one page and flushes them to the wire, expanding to the job's chosen
//! transfer mode at flush time. A reusable, capacity-capped arena that can
//! flush mid-page under memory pressure.

use std::io::Write;

use crate::error::{Error, Result};
use crate::rle::{self, RlePacket};
use crate::series::{self, Series};
use tracing::trace;

/// How buffered rows are written to the wire at flush time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Each row carries its own `g 0x00 <bytes_per_line>` header and raw bytes.
    UncompressedLine,
    /// Rows are written exactly as buffered: tagged, length-prefixed, RLE bodies.
    RunLength,
    /// A single page-level header declares the row count; raw bytes follow
    /// back to back with no per-row framing.
    BitImage,
}

/// Which page this is within the job, for the print-information command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageType {
    First = 0,
    Middle = 1,
    Last = 2,
}

/// Parameters needed to emit the optional per-flush print-information
/// command and to expand buffered rows into the chosen transfer mode.
#[derive(Clone, Debug)]
pub struct FlushContext {
    pub label_preamble: bool,
    pub quality_mode: bool,
    pub recover_mode: bool,
    pub media_kind: Option<u8>,
    pub media_width_mm: Option<u8>,
    pub media_length_mm: Option<u8>,
    pub page_type: PageType,
    pub transfer_mode: TransferMode,
    pub bytes_per_line: usize,
    pub series: Series,
}

const GROWTH_FLOOR: usize = 0x4000;
const HARD_CAP: usize = 1_000_000;

/// Accumulates tagged raster-line packets (`G`/`g`/`Z`) for one page.
pub struct RowArena {
    data: Vec<u8>,
    lines_waiting: u32,
    max_lines_waiting: u32,
}

impl RowArena {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            lines_waiting: 0,
            max_lines_waiting: u32::MAX,
        }
    }

    /// Flush automatically once this many rows are buffered. `0` disables
    /// the automatic flush (the size cap in [`ensure`] still applies).
    pub fn set_max_lines_waiting(&mut self, n: u32) {
        self.max_lines_waiting = if n == 0 { u32::MAX } else { n };
    }

    pub fn lines_waiting(&self) -> u32 {
        self.lines_waiting
    }

    fn ensure(&mut self, additional: usize, ctx: &FlushContext, sink: &mut impl Write) -> Result<()> {
        if self.data.len() + additional <= self.data.capacity() {
            return Ok(());
        }
        let requested = self.data.len() + additional;
        let target = (2 * self.data.capacity() + GROWTH_FLOOR).max(requested);
        if target <= HARD_CAP {
            self.data.reserve(target - self.data.len());
            return Ok(());
        }
        self.flush(ctx, sink)?;
        if self.data.len() + additional > self.data.capacity() {
            let capped = HARD_CAP.max(self.data.len() + additional);
            if capped > HARD_CAP {
                return Err(Error::OutOfBuffer);
            }
            self.data.reserve(capped - self.data.len());
        }
        Ok(())
    }

    /// Store an encoded raster line (`G`/`g` tag + length-prefixed body).
    pub fn store_row(
        &mut self,
        body: &[u8],
        ctx: &FlushContext,
        sink: &mut impl Write,
    ) -> Result<()> {
        self.ensure(3 + body.len(), ctx, sink)?;
        self.data.push(ctx.series.raster_letter());
        series::write_u16(ctx.series.length_endian(), body.len() as u16, &mut self.data);
        self.data.extend_from_slice(body);
        self.lines_waiting += 1;
        if self.lines_waiting >= self.max_lines_waiting {
            self.flush(ctx, sink)?;
        }
        Ok(())
    }

    /// Store `n` rows of pure background. Uses the device's `Z` shortcut
    /// when `xor_mask == 0` (bits already all clear); otherwise synthesizes
    /// full repeat-encoded rows, since `Z` always means "all-zero bits", not
    /// "background", and the two diverge under negative print.
    pub fn store_empty_rows(
        &mut self,
        n: u32,
        xor_mask: u8,
        ctx: &FlushContext,
        sink: &mut impl Write,
    ) -> Result<()> {
        if xor_mask == 0 {
            for _ in 0..n {
                self.ensure(1, ctx, sink)?;
                self.data.push(b'Z');
                self.lines_waiting += 1;
                if self.lines_waiting >= self.max_lines_waiting {
                    self.flush(ctx, sink)?;
                }
            }
        } else {
            let body = rle::encode_repeated(xor_mask, ctx.bytes_per_line);
            for _ in 0..n {
                self.store_row(&body, ctx, sink)?;
            }
        }
        Ok(())
    }

    /// Store the result of encoding one row.
    pub fn store_packet(
        &mut self,
        packet: RlePacket,
        xor_mask: u8,
        ctx: &FlushContext,
        sink: &mut impl Write,
    ) -> Result<()> {
        match packet {
            RlePacket::Runs(body) => self.store_row(&body, ctx, sink),
            RlePacket::EmptyRow => self.store_empty_rows(1, xor_mask, ctx, sink),
        }
    }

    /// Write all buffered rows to `sink`, expanding to `ctx.transfer_mode` as
    /// needed, then reset for the next batch. A no-op when nothing is buffered.
    pub fn flush(&mut self, ctx: &FlushContext, sink: &mut impl Write) -> Result<()> {
        if self.lines_waiting == 0 {
            return Ok(());
        }
        trace!(
            lines = self.lines_waiting,
            bytes = self.data.len(),
            transfer_mode = ?ctx.transfer_mode,
            "flushing row arena"
        );
        if ctx.label_preamble {
            write_print_information(sink, ctx, self.lines_waiting)?;
        }
        match ctx.transfer_mode {
            TransferMode::RunLength => sink.write_all(&self.data)?,
            TransferMode::UncompressedLine => self.expand_uncompressed(ctx, sink)?,
            TransferMode::BitImage => self.expand_bit_image(ctx, sink)?,
        }
        self.data.clear();
        self.lines_waiting = 0;
        Ok(())
    }

    fn for_each_decoded_row(&self, ctx: &FlushContext, mut f: impl FnMut(&[u8])) {
        let mut pos = 0usize;
        let mut row = vec![0u8; ctx.bytes_per_line];
        while pos < self.data.len() {
            let tag = self.data[pos];
            pos += 1;
            if tag == b'Z' {
                row.iter_mut().for_each(|b| *b = 0);
                f(&row);
                continue;
            }
            let len_bytes = [self.data[pos], self.data[pos + 1]];
            pos += 2;
            let len = series::read_u16(ctx.series.length_endian(), len_bytes) as usize;
            let body = &self.data[pos..pos + len];
            pos += len;
            row.iter_mut().for_each(|b| *b = 0);
            let written = rle::decode_into(body, &mut row);
            for b in &mut row[written..] {
                *b = 0;
            }
            f(&row);
        }
    }

    fn expand_uncompressed(&self, ctx: &FlushContext, sink: &mut impl Write) -> Result<()> {
        let mut err = None;
        self.for_each_decoded_row(ctx, |row| {
            if err.is_some() {
                return;
            }
            let header = [b'g', 0x00, ctx.bytes_per_line as u8];
            if let Err(e) = sink.write_all(&header).and_then(|_| sink.write_all(row)) {
                err = Some(e);
            }
        });
        if let Some(e) = err {
            return Err(Error::Io(e));
        }
        Ok(())
    }

    fn expand_bit_image(&self, ctx: &FlushContext, sink: &mut impl Write) -> Result<()> {
        let mut err = None;
        self.for_each_decoded_row(ctx, |row| {
            if err.is_some() {
                return;
            }
            if let Err(e) = sink.write_all(row) {
                err = Some(e);
            }
        });
        if let Some(e) = err {
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

impl Default for RowArena {
    fn default() -> Self {
        Self::new()
    }
}

fn write_print_information(
    sink: &mut impl Write,
    ctx: &FlushContext,
    lines: u32,
) -> Result<()> {
    let mut valid = 0u8;
    if ctx.media_kind.is_some() {
        valid |= 0x02;
    }
    if ctx.media_width_mm.is_some() {
        valid |= 0x04;
    }
    if ctx.media_length_mm.is_some() {
        valid |= 0x08;
    }
    if ctx.quality_mode {
        valid |= 0x40;
    }
    if ctx.recover_mode {
        valid |= 0x80;
    }
    let mut buf = Vec::with_capacity(13);
    buf.extend_from_slice(&[0x1B, b'i', b'z']);
    buf.push(valid);
    buf.push(ctx.media_kind.unwrap_or(0));
    buf.push(ctx.media_width_mm.unwrap_or(0));
    buf.push(ctx.media_length_mm.unwrap_or(0));
    buf.extend_from_slice(&lines.to_le_bytes());
    buf.push(ctx.page_type as u8);
    buf.push(0x00);
    sink.write_all(&buf).map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(transfer_mode: TransferMode) -> FlushContext {
        FlushContext {
            label_preamble: false,
            quality_mode: false,
            recover_mode: false,
            media_kind: None,
            media_width_mm: None,
            media_length_mm: None,
            page_type: PageType::First,
            transfer_mode,
            bytes_per_line: 4,
            series: Series::Pt,
        }
    }

    #[test]
    fn flush_is_noop_with_nothing_buffered() {
        let mut arena = RowArena::new();
        let mut sink = Vec::new();
        arena.flush(&ctx(TransferMode::RunLength), &mut sink).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn run_length_flush_writes_raw_tagged_bytes() {
        let mut arena = RowArena::new();
        let c = ctx(TransferMode::RunLength);
        let mut sink = Vec::new();
        let body = match rle::encode(&[1, 2, 3, 4], 0) {
            RlePacket::Runs(b) => b,
            _ => panic!(),
        };
        arena.store_row(&body, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(sink[0], b'G');
        assert_eq!(arena.lines_waiting(), 0);
    }

    #[test]
    fn empty_rows_use_z_token_when_xor_mask_is_zero() {
        let mut arena = RowArena::new();
        let c = ctx(TransferMode::RunLength);
        let mut sink = Vec::new();
        arena.store_empty_rows(3, 0, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(sink, vec![b'Z', b'Z', b'Z']);
    }

    #[test]
    fn empty_rows_synthesize_repeat_runs_under_negative_print() {
        let mut arena = RowArena::new();
        let c = ctx(TransferMode::RunLength);
        let mut sink = Vec::new();
        arena.store_empty_rows(1, 0xFF, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(sink[0], b'G');
        // decode and check the row is entirely 0xFF
        let len = u16::from_le_bytes([sink[1], sink[2]]) as usize;
        let mut row = vec![0u8; 4];
        rle::decode_into(&sink[3..3 + len], &mut row);
        assert_eq!(row, [0xFF; 4]);
    }

    #[test]
    fn uncompressed_expansion_always_uses_lowercase_g_with_big_endian_width() {
        let mut arena = RowArena::new();
        let c = ctx(TransferMode::UncompressedLine);
        let mut sink = Vec::new();
        let body = match rle::encode(&[9, 9, 9, 9], 0) {
            RlePacket::Runs(b) => b,
            _ => panic!(),
        };
        arena.store_row(&body, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(&sink[..3], &[b'g', 0x00, 4]);
        assert_eq!(&sink[3..7], &[9, 9, 9, 9]);
    }

    #[test]
    fn bit_image_expansion_has_no_per_row_framing() {
        let mut arena = RowArena::new();
        let c = ctx(TransferMode::BitImage);
        let mut sink = Vec::new();
        arena.store_empty_rows(2, 0, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(sink, vec![0u8; 8]);
    }

    #[test]
    fn print_information_precedes_flush_when_label_preamble_set() {
        let mut arena = RowArena::new();
        let mut c = ctx(TransferMode::RunLength);
        c.label_preamble = true;
        c.quality_mode = true;
        let mut sink = Vec::new();
        arena.store_empty_rows(5, 0, &c, &mut sink).unwrap();
        arena.flush(&c, &mut sink).unwrap();
        assert_eq!(&sink[..3], &[0x1B, b'i', b'z']);
        assert_eq!(sink[3], 0x40); // quality bit only
        let lines = u32::from_le_bytes([sink[7], sink[8], sink[9], sink[10]]);
        assert_eq!(lines, 5);
    }

    #[test]
    fn auto_flush_triggers_at_max_lines_waiting() {
        let mut arena = RowArena::new();
        arena.set_max_lines_waiting(2);
        let c = ctx(TransferMode::RunLength);
        let mut sink = Vec::new();
        arena.store_empty_rows(2, 0, &c, &mut sink).unwrap();
        assert_eq!(arena.lines_waiting(), 0);
        assert_eq!(sink, vec![b'Z', b'Z']);
    }
}
