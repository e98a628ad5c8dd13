//! Pluggable source of page headers and rows for the sequencer.
//!
//! [`VecReader`] is an in-memory implementation used by tests and the
//! decoder's round-trip checks; [`CupsStyleReader`] reads a compact,
//! CUPS-raster-inspired page-header-then-rows container from any
//! `std::io::Read`.

use std::io::Read;

use crate::error::ReaderError;

/// Page geometry and imaging-area metadata the sequencer needs to plan
/// margins, alignment and the print-information command.
#[derive(Clone, Debug, PartialEq)]
pub struct PageHeader {
    pub resolution_x: u32,
    pub resolution_y: u32,
    pub page_width_pt: f64,
    pub page_height_pt: f64,
    /// `[left, bottom, right, top]` in points, within the page box.
    pub imaging_bbox: [f64; 4],
    pub row_byte_count: u32,
    pub row_pixel_count: u32,
    pub row_count: u32,
    pub negative_print: bool,
}

/// Source of page headers and row data for one job (possibly many pages).
pub trait RasterReader {
    /// Read the next page header, or `None` at end of job.
    fn read_page_header(&mut self) -> Result<Option<PageHeader>, ReaderError>;

    /// Read one row of `header.row_byte_count` bytes into `buf`. Returns
    /// `false` if the stream ended early (fewer rows than `row_count`
    /// promised), which the caller treats as a reader error.
    fn read_row(&mut self, buf: &mut [u8]) -> Result<bool, ReaderError>;
}

/// An in-memory set of pages, each a header plus its rows. Useful for tests
/// and for decoding a stream back into a form comparable against the
/// original job.
pub struct VecReader {
    pages: std::vec::IntoIter<(PageHeader, Vec<Vec<u8>>)>,
    current_rows: std::vec::IntoIter<Vec<u8>>,
    page_index: u32,
}

impl VecReader {
    pub fn new(pages: Vec<(PageHeader, Vec<Vec<u8>>)>) -> Self {
        Self {
            pages: pages.into_iter(),
            current_rows: Vec::new().into_iter(),
            page_index: 0,
        }
    }
}

impl RasterReader for VecReader {
    fn read_page_header(&mut self) -> Result<Option<PageHeader>, ReaderError> {
        match self.pages.next() {
            Some((header, rows)) => {
                self.page_index += 1;
                self.current_rows = rows.into_iter();
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    fn read_row(&mut self, buf: &mut [u8]) -> Result<bool, ReaderError> {
        match self.current_rows.next() {
            Some(row) => {
                if row.len() != buf.len() {
                    return Err(ReaderError {
                        page: Some(self.page_index),
                        reason: format!(
                            "row length {} does not match declared row_byte_count {}",
                            row.len(),
                            buf.len()
                        ),
                    });
                }
                buf.copy_from_slice(&row);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

const HEADER_LEN: usize = 48;

/// Reads a compact, CUPS-inspired page-header-then-rows container:
/// a fixed 48-byte big-endian header followed immediately by
/// `row_byte_count * row_count` raw bytes.
pub struct CupsStyleReader<R: Read> {
    inner: R,
    page_index: u32,
    row_byte_count: usize,
    rows_left: u32,
}

impl<R: Read> CupsStyleReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            page_index: 0,
            row_byte_count: 0,
            rows_left: 0,
        }
    }

    fn err(&self, reason: impl Into<String>) -> ReaderError {
        ReaderError {
            page: Some(self.page_index),
            reason: reason.into(),
        }
    }
}

impl<R: Read> RasterReader for CupsStyleReader<R> {
    fn read_page_header(&mut self) -> Result<Option<PageHeader>, ReaderError> {
        let mut buf = [0u8; HEADER_LEN];
        let mut read = 0usize;
        while read < HEADER_LEN {
            let n = self
                .inner
                .read(&mut buf[read..])
                .map_err(|e| self.err(e.to_string()))?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read == 0 {
            return Ok(None);
        }
        if read != HEADER_LEN {
            return Err(self.err("truncated page header"));
        }
        self.page_index += 1;

        let u32_at = |o: usize| u32::from_be_bytes(buf[o..o + 4].try_into().unwrap());
        let f32_at = |o: usize| f32::from_be_bytes(buf[o..o + 4].try_into().unwrap()) as f64;

        let resolution_x = u32_at(0);
        let resolution_y = u32_at(4);
        let page_width_pt = f32_at(8);
        let page_height_pt = f32_at(12);
        let imaging_bbox = [f32_at(16), f32_at(20), f32_at(24), f32_at(28)];
        let row_byte_count = u32_at(32);
        let row_pixel_count = u32_at(36);
        let row_count = u32_at(40);
        let negative_print = u32_at(44) != 0;

        self.row_byte_count = row_byte_count as usize;
        self.rows_left = row_count;

        Ok(Some(PageHeader {
            resolution_x,
            resolution_y,
            page_width_pt,
            page_height_pt,
            imaging_bbox,
            row_byte_count,
            row_pixel_count,
            row_count,
            negative_print,
        }))
    }

    fn read_row(&mut self, buf: &mut [u8]) -> Result<bool, ReaderError> {
        if self.rows_left == 0 {
            return Ok(false);
        }
        if buf.len() != self.row_byte_count {
            return Err(self.err(format!(
                "row buffer length {} does not match header row_byte_count {}",
                buf.len(),
                self.row_byte_count
            )));
        }
        let mut read = 0usize;
        while read < buf.len() {
            let n = self
                .inner
                .read(&mut buf[read..])
                .map_err(|e| self.err(e.to_string()))?;
            if n == 0 {
                return Err(self.err("short row: stream ended mid-row"));
            }
            read += n;
        }
        self.rows_left -= 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> PageHeader {
        PageHeader {
            resolution_x: 360,
            resolution_y: 360,
            page_width_pt: 100.0,
            page_height_pt: 50.0,
            imaging_bbox: [0.0, 0.0, 100.0, 50.0],
            row_byte_count: 2,
            row_pixel_count: 16,
            row_count: 2,
            negative_print: false,
        }
    }

    #[test]
    fn vec_reader_yields_pages_then_none() {
        let mut reader = VecReader::new(vec![(header(), vec![vec![1, 2], vec![3, 4]])]);
        let h = reader.read_page_header().unwrap().unwrap();
        assert_eq!(h.row_count, 2);
        let mut buf = [0u8; 2];
        assert!(reader.read_row(&mut buf).unwrap());
        assert_eq!(buf, [1, 2]);
        assert!(reader.read_row(&mut buf).unwrap());
        assert_eq!(buf, [3, 4]);
        assert!(!reader.read_row(&mut buf).unwrap());
        assert!(reader.read_page_header().unwrap().is_none());
    }

    fn write_cups_header(out: &mut Vec<u8>, h: &PageHeader) {
        out.extend_from_slice(&h.resolution_x.to_be_bytes());
        out.extend_from_slice(&h.resolution_y.to_be_bytes());
        out.extend_from_slice(&(h.page_width_pt as f32).to_be_bytes());
        out.extend_from_slice(&(h.page_height_pt as f32).to_be_bytes());
        for v in h.imaging_bbox {
            out.extend_from_slice(&(v as f32).to_be_bytes());
        }
        out.extend_from_slice(&h.row_byte_count.to_be_bytes());
        out.extend_from_slice(&h.row_pixel_count.to_be_bytes());
        out.extend_from_slice(&h.row_count.to_be_bytes());
        out.extend_from_slice(&(h.negative_print as u32).to_be_bytes());
    }

    #[test]
    fn cups_style_reader_round_trips_header_and_rows() {
        let h = header();
        let mut bytes = Vec::new();
        write_cups_header(&mut bytes, &h);
        bytes.extend_from_slice(&[1, 2]);
        bytes.extend_from_slice(&[3, 4]);

        let mut reader = CupsStyleReader::new(std::io::Cursor::new(bytes));
        let read_header = reader.read_page_header().unwrap().unwrap();
        assert_eq!(read_header, h);
        let mut buf = [0u8; 2];
        assert!(reader.read_row(&mut buf).unwrap());
        assert_eq!(buf, [1, 2]);
        assert!(reader.read_row(&mut buf).unwrap());
        assert_eq!(buf, [3, 4]);
        assert!(!reader.read_row(&mut buf).unwrap());
        assert!(reader.read_page_header().unwrap().is_none());
    }

    #[test]
    fn cups_style_reader_rejects_truncated_header() {
        let mut reader = CupsStyleReader::new(std::io::Cursor::new(vec![0u8; 10]));
        assert!(reader.read_page_header().is_err());
    }
}
