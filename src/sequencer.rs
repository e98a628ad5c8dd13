//! Command sequencer: the per-job/per-page state machine that turns a
//! [`RasterReader`]'s pages into a Brother raster command stream.
//!
//! Owns the ordering of initialization, mode-selection, margin, and
//! print-information commands across a whole multi-page job, plus the
//! per-page row transform/encode/buffer loop.

use std::io::Write;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::options::{Alignment, JobOptions, Media};
use crate::reader::{PageHeader, RasterReader};
use crate::rle::{self, RlePacket};
use crate::rowbuf::{FlushContext, PageType, RowArena, TransferMode};
use crate::transform::transform_row;
use tracing::{debug, warn};

/// State machine phase, kept mostly for documentation/assertions; the
/// control flow in [`Sequencer::run`] already encodes these transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqState {
    Idle,
    PageOpen,
    RowPhase,
    PageClose,
    Done,
}

/// Geometry derived from a page header and the job's media/alignment choice:
/// how many leading/trailing rows to discard or synthesize, and the device
/// feed amount to request via `ESC i d`.
struct MarginPlan {
    top_skip: u32,
    bot_skip: u32,
    top_empty_lines: u32,
    bot_empty_lines: u32,
    feed_pixels: u16,
}

fn margin_plan(options: &JobOptions, header: &PageHeader) -> MarginPlan {
    let px_per_pt_y = header.resolution_y as f64 / 72.0;
    let min_margin_rows = (options.min_margin * px_per_pt_y).round().max(0.0) as u32;
    let gap_top_rows = ((header.page_height_pt - header.imaging_bbox[3]) * px_per_pt_y)
        .max(0.0)
        .floor() as u32;
    let gap_bot_rows = (header.imaging_bbox[1] * px_per_pt_y).max(0.0).floor() as u32;

    match options.media {
        Media::ContinuousTape => MarginPlan {
            top_skip: gap_top_rows.min(min_margin_rows),
            bot_skip: gap_bot_rows.min(min_margin_rows),
            top_empty_lines: 0,
            bot_empty_lines: 0,
            feed_pixels: ((options.min_margin + options.margin) * px_per_pt_y).round() as u16,
        },
        Media::DieCutLabels => MarginPlan {
            top_skip: 0,
            bot_skip: 0,
            top_empty_lines: gap_top_rows,
            bot_empty_lines: gap_bot_rows,
            feed_pixels: 0,
        },
    }
}

/// Row placement derived from the job's alignment choice and the header's
/// declared row width versus the output `bytes_per_line`.
struct RowPlacement {
    input_len: usize,
    left_padding_bytes: usize,
    right_padding_bytes: usize,
    shift: i32,
}

fn row_placement(options: &JobOptions, header: &PageHeader) -> RowPlacement {
    let bytes_per_line = options.bytes_per_line as usize;
    let mut input_len = header.row_byte_count as usize;

    match options.alignment {
        Alignment::Right => {
            if input_len > bytes_per_line {
                input_len = bytes_per_line;
            }
            RowPlacement {
                input_len,
                left_padding_bytes: 0,
                right_padding_bytes: 0,
                shift: 0,
            }
        }
        Alignment::Center => {
            let total_output_bits = bytes_per_line * 8;
            let input_bits = header.row_pixel_count as usize;
            let total_pad_bits = total_output_bits.saturating_sub(input_bits);
            // Split the padding 50/50: whole bytes to the left, the sub-byte
            // remainder realized as a right-shift of the data itself.
            let left_pad_bits = total_pad_bits / 2;
            let mut left_padding_bytes = left_pad_bits / 8;
            let shift = (left_pad_bits % 8) as i32;
            let extra = usize::from(shift > 0);

            while left_padding_bytes + input_len + extra > bytes_per_line && input_len > 0 {
                input_len -= 1;
            }
            while left_padding_bytes + input_len + extra > bytes_per_line && left_padding_bytes > 0 {
                left_padding_bytes -= 1;
            }
            let right_padding_bytes = bytes_per_line
                .saturating_sub(left_padding_bytes)
                .saturating_sub(input_len)
                .saturating_sub(extra);

            RowPlacement {
                input_len,
                left_padding_bytes,
                right_padding_bytes,
                shift,
            }
        }
    }
}

fn xor_mask(negative_print: bool) -> u8 {
    if negative_print {
        0xFF
    } else {
        0x00
    }
}

pub struct Sequencer<W: Write> {
    sink: W,
    options: JobOptions,
    cancel: CancelToken,
    /// Owned by the sequencer and reused across pages so its buffer capacity
    /// survives from one page to the next instead of being rebuilt each time.
    arena: RowArena,
}

impl<W: Write> Sequencer<W> {
    pub fn new(sink: W, options: JobOptions, cancel: CancelToken) -> Self {
        Self {
            sink,
            options,
            cancel,
            arena: RowArena::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Run a whole job: read every page from `reader`, emitting the full
    /// device command stream, and return the underlying sink. Returns
    /// [`Error::Cancelled`] if the cancel token fires between pages.
    pub fn run(mut self, reader: &mut impl RasterReader) -> Result<W> {
        let mut next_header = reader.read_page_header().map_err(Error::Reader)?;
        if next_header.is_none() {
            return Ok(self.sink);
        }

        self.emit_job_init()?;

        let mut page_index = 1u32;
        let mut carried_empty: u32 = 0;

        while let Some(header) = next_header.take() {
            let lookahead = reader.read_page_header().map_err(Error::Reader)?;
            let is_last = lookahead.is_none();

            match self.run_page(reader, &header, is_last, page_index, carried_empty) {
                Ok(c) => carried_empty = c,
                Err(Error::Cancelled) => {
                    warn!(page_index, "job cancelled mid-page, discarding buffered rows and ejecting");
                    self.sink.write_all(&[0x1a]).map_err(Error::Io)?;
                    return Err(Error::Cancelled);
                }
                Err(e) => return Err(e),
            }

            next_header = lookahead;
            page_index += 1;

            if self.cancel.is_cancelled() {
                warn!(page_index, "job cancelled, ejecting and stopping");
                self.sink.write_all(&[0x1a]).map_err(Error::Io)?;
                return Err(Error::Cancelled);
            }
        }
        debug!(pages = page_index - 1, "job finished");
        Ok(self.sink)
    }

    fn emit_job_init(&mut self) -> Result<()> {
        self.sink.write_all(&[0x00; 350]).map_err(Error::Io)?;
        self.sink.write_all(b"\x1B\x40").map_err(Error::Io)?;
        if let Some(mode) = self.options.legacy_xfer_mode {
            self.sink
                .write_all(&[0x1B, b'i', b'R', mode])
                .map_err(Error::Io)?;
        }
        if let Some(mode) = self.options.xfer_mode {
            self.sink
                .write_all(&[0x1B, b'i', b'a', mode])
                .map_err(Error::Io)?;
        }
        if let Some(n) = self.options.status_notification {
            self.sink
                .write_all(&[0x1B, b'i', b'!', n])
                .map_err(Error::Io)?;
        }
        Ok(())
    }

    fn run_page(
        &mut self,
        reader: &mut impl RasterReader,
        header: &PageHeader,
        is_last: bool,
        page_index: u32,
        carried_empty: u32,
    ) -> Result<u32> {
        let plan = margin_plan(&self.options, header);
        let placement = row_placement(&self.options, header);
        let mask = xor_mask(header.negative_print);
        let page_type = if page_index == 1 {
            PageType::First
        } else if is_last && self.options.last_page_flag {
            PageType::Last
        } else {
            PageType::Middle
        };

        debug!(
            page_index,
            rows = header.row_count,
            row_byte_count = header.row_byte_count,
            is_last,
            "opening page"
        );

        if header.page_width_pt / 72.0 * 25.4 > 255.0 {
            warn!(
                page_index,
                width_mm = header.page_width_pt / 72.0 * 25.4,
                "page width exceeds 255mm, clamping"
            );
        }
        if header.page_height_pt / 72.0 * 25.4 > 255.0 {
            warn!(
                page_index,
                height_mm = header.page_height_pt / 72.0 * 25.4,
                "page height exceeds 255mm, clamping"
            );
        }

        self.emit_page_open(header, &plan, page_type)?;

        let ctx = FlushContext {
            label_preamble: self.options.label_preamble,
            quality_mode: self.options.quality_high,
            recover_mode: self.options.label_recovery,
            media_kind: None,
            media_width_mm: None,
            media_length_mm: None,
            page_type,
            transfer_mode: self.options.transfer_mode,
            bytes_per_line: self.options.bytes_per_line as usize,
            series: self.options.series(),
        };

        let mut pending_empty = carried_empty + plan.top_empty_lines;

        let mut raw = vec![0u8; header.row_byte_count as usize];
        let mut encoded = vec![0u8; self.options.bytes_per_line as usize];

        for row_idx in 0..header.row_count {
            if self.cancel.is_cancelled() {
                debug!(page_index, row_idx, "cancelled mid-page, discarding buffered rows");
                return Err(Error::Cancelled);
            }
            let is_skip =
                row_idx < plan.top_skip || row_idx >= header.row_count.saturating_sub(plan.bot_skip);
            let ok = reader.read_row(&mut raw).map_err(Error::Reader)?;
            if !ok {
                return Err(Error::Reader(crate::error::ReaderError {
                    page: Some(page_index),
                    reason: format!(
                        "expected {} rows, reader ended at row {}",
                        header.row_count, row_idx
                    ),
                }));
            }
            if is_skip {
                continue;
            }

            let nonzero = transform_row(
                &raw,
                placement.input_len,
                &mut encoded,
                self.options.bytes_per_line as usize,
                placement.left_padding_bytes,
                placement.right_padding_bytes,
                placement.shift,
                self.options.mirror_print && self.options.software_mirror,
                mask,
            );

            if !nonzero {
                pending_empty += 1;
                continue;
            }

            if pending_empty > 0 {
                self.arena.store_empty_rows(pending_empty, mask, &ctx, &mut self.sink)?;
                pending_empty = 0;
            }
            match rle::encode(&encoded, mask) {
                RlePacket::Runs(body) => {
                    self.arena.store_row(&body, &ctx, &mut self.sink)?;
                }
                RlePacket::EmptyRow => unreachable!("nonzero row cannot be all background"),
            }
        }

        pending_empty += plan.bot_empty_lines;

        let carry_forward = if self.options.concat_pages && !is_last {
            self.arena.flush(&ctx, &mut self.sink)?;
            pending_empty
        } else {
            if pending_empty > 0 {
                self.arena.store_empty_rows(pending_empty, mask, &ctx, &mut self.sink)?;
            }
            self.arena.flush(&ctx, &mut self.sink)?;
            0
        };

        if is_last || !self.options.concat_pages {
            self.emit_page_close(is_last)?;
        }
        debug!(page_index, carry_forward, "page closed");
        Ok(carry_forward)
    }

    fn emit_page_open(
        &mut self,
        header: &PageHeader,
        plan: &MarginPlan,
        page_type: PageType,
    ) -> Result<()> {
        if self.options.print_density >= 1 && self.options.print_density <= 5 {
            self.sink
                .write_all(&[0x1B, b'i', b'D', self.options.print_density])
                .map_err(Error::Io)?;
        }

        let hires = header.resolution_y == 720;
        let legacy_hires_applies = self.options.legacy_hires
            && header.resolution_x == 360
            && matches!(header.resolution_y, 360 | 720);
        if legacy_hires_applies {
            let width_mm = ((header.imaging_bbox[2] - header.imaging_bbox[0]) * 25.4 / 72.0)
                .round()
                .clamp(0.0, 255.0) as u8;
            self.sink
                .write_all(&[0x1B, b'i', b'c', 0x00, 0x00, width_mm, 0x00, u8::from(hires)])
                .map_err(Error::Io)?;
        }

        let mut m_flags = 0u8;
        if self.options.auto_cut || self.options.cut_mark {
            m_flags |= 0x40;
        }
        if self.options.mirror_print && !self.options.software_mirror {
            m_flags |= 0x80;
        }
        self.sink
            .write_all(&[0x1B, b'i', b'M', m_flags])
            .map_err(Error::Io)?;

        let mut k_flags = 0u8;
        if !self.options.quality_high {
            k_flags |= 0x01;
        }
        if self.options.half_cut {
            k_flags |= 0x04;
        }
        if !self.options.chain_printing {
            k_flags |= 0x08;
        }
        if hires && !legacy_hires_applies {
            k_flags |= 0x40;
        }
        self.sink
            .write_all(&[0x1B, b'i', b'K', k_flags])
            .map_err(Error::Io)?;

        if let Some(n) = self.options.cut_label {
            self.sink.write_all(&[0x1B, b'i', b'A', n]).map_err(Error::Io)?;
        }

        self.sink
            .write_all(&[0x1B, b'i', b'd'])
            .map_err(Error::Io)?;
        self.sink
            .write_all(&plan.feed_pixels.to_le_bytes())
            .map_err(Error::Io)?;

        match self.options.transfer_mode {
            TransferMode::RunLength => {
                self.sink.write_all(&[b'M', 0x02]).map_err(Error::Io)?;
            }
            TransferMode::BitImage => {
                let lines = header.row_count.min(u16::MAX as u32) as u16;
                self.sink
                    .write_all(&[0x1B, b'*', b'\''])
                    .map_err(Error::Io)?;
                self.sink.write_all(&lines.to_le_bytes()).map_err(Error::Io)?;
            }
            TransferMode::UncompressedLine => {}
        }

        let _ = page_type;
        Ok(())
    }

    fn emit_page_close(&mut self, is_last: bool) -> Result<()> {
        if is_last {
            self.sink.write_all(&[0x1a]).map_err(Error::Io)
        } else {
            self.sink.write_all(&[0x0c]).map_err(Error::Io)
        }
    }
}
