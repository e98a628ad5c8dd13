//! End-to-end scenarios driving the real [`Sequencer`] against synthetic
//! pages and inspecting the emitted byte stream.

use ptouch_raster::cancel::CancelToken;
use ptouch_raster::options::{JobOptions, Media};
use ptouch_raster::reader::{PageHeader, VecReader};
use ptouch_raster::sequencer::Sequencer;

fn flat_header(row_count: u32, row_byte_count: u32) -> PageHeader {
    PageHeader {
        resolution_x: 180,
        resolution_y: 180,
        page_width_pt: 100.0,
        page_height_pt: 100.0,
        imaging_bbox: [0.0, 0.0, 100.0, 100.0],
        row_byte_count,
        row_pixel_count: row_byte_count * 8,
        row_count,
        negative_print: false,
    }
}

fn run(options: JobOptions, pages: Vec<(PageHeader, Vec<Vec<u8>>)>) -> Vec<u8> {
    let mut reader = VecReader::new(pages);
    Sequencer::new(Vec::new(), options, CancelToken::new())
        .run(&mut reader)
        .unwrap()
}

fn count(haystack: &[u8], byte: u8) -> usize {
    haystack.iter().filter(|&&b| b == byte).count()
}

/// Single blank page, continuous tape, ql-series, 90 bytes/line, 10 rows.
#[test]
fn scenario_blank_page_ql_series_continuous_tape() {
    let mut options = JobOptions::default();
    options.apply("nopt-series").unwrap();
    options.apply("ql-series").unwrap();
    options.apply("bytes-per-line=90").unwrap();
    options.apply("min-margin=0").unwrap();
    options.apply("margin=0").unwrap();

    let rows = vec![vec![0u8; 90]; 10];
    let out = run(options, vec![(flat_header(10, 90), rows)]);

    assert_eq!(&out[..350], &[0u8; 350][..]);
    assert_eq!(&out[350..352], b"\x1B\x40");

    // M 0x02 selects run-length compression, emitted once during page-open.
    let m_pos = out.windows(2).position(|w| w == [b'M', 0x02]);
    assert!(m_pos.is_some(), "expected M 0x02 compression-select command");

    // ESC i d 0 0 (no feed requested): find "ESC i d" followed by 0,0.
    let d_pos = out
        .windows(3)
        .position(|w| w == [0x1B, b'i', b'd'])
        .expect("expected ESC i d command");
    assert_eq!(&out[d_pos + 3..d_pos + 5], &[0, 0]);

    // All 10 rows are blank and collapse to Z tokens.
    let z_run = out.windows(10).position(|w| w.iter().all(|&b| b == b'Z'));
    assert!(z_run.is_some(), "expected a run of 10 Z tokens");

    assert_eq!(*out.last().unwrap(), 0x1a);
    assert_eq!(count(&out, 0x1a), 1);
    assert_eq!(count(&out, 0x0c), 0);
}

/// Two-page job, pt-series, legacy transfer mode = 1, each page has 3
/// non-blank rows; pages are separated by a form feed and the job ends
/// with a single eject byte.
#[test]
fn scenario_two_page_job_legacy_xfer_mode() {
    let mut options = JobOptions::default();
    options.apply("legacy-xfer-mode=1").unwrap();
    options.apply("bytes-per-line=2").unwrap();

    let rows = vec![vec![0x00u8, 0xFF]; 3];
    let pages = vec![
        (flat_header(3, 2), rows.clone()),
        (flat_header(3, 2), rows),
    ];
    let out = run(options, pages);

    assert_eq!(&out[..350], &[0u8; 350][..]);
    assert_eq!(&out[350..352], b"\x1B\x40");
    assert_eq!(&out[352..356], &[0x1B, b'i', b'R', 0x01]);

    // Six rows total (3 per page), each pt-series little-endian 'G' packet.
    assert_eq!(count(&out, b'G'), 6);

    assert_eq!(count(&out, 0x0c), 1);
    assert_eq!(count(&out, 0x1a), 1);
    assert_eq!(*out.last().unwrap(), 0x1a);

    // The form feed must precede the eject byte (page 1 closes before page 2).
    let ff = out.iter().position(|&b| b == 0x0c).unwrap();
    let eject = out.iter().rposition(|&b| b == 0x1a).unwrap();
    assert!(ff < eject);
}

/// Consecutive all-background rows under negative print must be expanded to
/// full RLE rows of `xor_mask`, never the bare `Z` shortcut.
#[test]
fn scenario_negative_print_empty_rows_are_not_z_tokens() {
    let mut options = JobOptions::default();
    options.apply("bytes-per-line=4").unwrap();

    let mut header = flat_header(5, 4);
    header.negative_print = true;
    let rows = vec![vec![0x00u8; 4]; 5];

    let out = run(options, vec![(header, rows)]);

    // No bare Z tokens: every background row became a full G-tagged packet.
    assert_eq!(count(&out, b'Z'), 0);
    assert_eq!(count(&out, b'G'), 5);
}

/// Concatenated pages emit exactly one eject byte, no form feed between
/// pages, and the top margin of the second page is suppressed (folded into
/// the first page's trailing margin instead).
#[test]
fn scenario_concat_pages_single_eject_no_form_feed() {
    let mut options = JobOptions::default();
    options.apply("concat-pages").unwrap();
    options.apply("media=die-cut-labels").unwrap();
    options.apply("bytes-per-line=2").unwrap();
    assert_eq!(options.media, Media::DieCutLabels);

    let mut header = flat_header(2, 2);
    header.imaging_bbox = [0.0, 5.0, 100.0, 95.0]; // 5pt gap top and bottom
    let rows = vec![vec![0xFFu8, 0xFF]; 2];
    let pages = vec![(header.clone(), rows.clone()), (header, rows)];

    let out = run(options, pages);

    assert_eq!(count(&out, 0x0c), 0);
    assert_eq!(count(&out, 0x1a), 1);
    assert_eq!(*out.last().unwrap(), 0x1a);
}
