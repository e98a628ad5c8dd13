//! Job-wide configuration, parsed from repeated `key=value` (or bare
//! boolean) tokens into a single validated struct, since the option set
//! here is open-ended and forwarded largely as-is to the sequencer.

use crate::error::{ConfigError, ConfigReason};
use crate::rowbuf::TransferMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Right,
    Center,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Media {
    ContinuousTape,
    DieCutLabels,
}

/// Fully resolved, validated job configuration.
#[derive(Clone, Debug)]
pub struct JobOptions {
    pub transfer_mode: TransferMode,
    pub quality_high: bool,
    pub auto_cut: bool,
    pub half_cut: bool,
    pub cut_mark: bool,
    pub chain_printing: bool,
    pub mirror_print: bool,
    pub pt_series: bool,
    pub ql_series: bool,
    pub software_mirror: bool,
    pub label_preamble: bool,
    pub label_recovery: bool,
    pub last_page_flag: bool,
    pub legacy_hires: bool,
    pub concat_pages: bool,
    pub bytes_per_line: u8,
    pub cut_label: Option<u8>,
    pub print_density: u8,
    pub legacy_xfer_mode: Option<u8>,
    pub xfer_mode: Option<u8>,
    pub status_notification: Option<u8>,
    pub alignment: Alignment,
    pub media: Media,
    pub min_margin: f64,
    pub margin: f64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            transfer_mode: TransferMode::RunLength,
            quality_high: true,
            auto_cut: false,
            half_cut: false,
            cut_mark: false,
            chain_printing: false,
            mirror_print: false,
            pt_series: true,
            ql_series: false,
            software_mirror: false,
            label_preamble: true,
            label_recovery: true,
            last_page_flag: true,
            legacy_hires: false,
            concat_pages: false,
            bytes_per_line: 16,
            cut_label: None,
            print_density: 0,
            legacy_xfer_mode: None,
            xfer_mode: None,
            status_notification: None,
            alignment: Alignment::Right,
            media: Media::ContinuousTape,
            min_margin: 0.0,
            margin: 0.0,
        }
    }
}

impl JobOptions {
    pub fn series(&self) -> crate::series::Series {
        if self.ql_series {
            crate::series::Series::Ql
        } else {
            crate::series::Series::Pt
        }
    }

    /// Apply one `key=value`, `key` (boolean true), or `nokey` (boolean
    /// false) token.
    pub fn apply(&mut self, token: &str) -> Result<(), ConfigError> {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };

        macro_rules! bool_flag {
            ($field:expr) => {{
                $field = parse_bool_token(key, value)?;
                return Ok(());
            }};
        }

        match key {
            "quality-high" | "noquality-high" => bool_flag!(self.quality_high),
            "auto-cut" | "noauto-cut" => bool_flag!(self.auto_cut),
            "half-cut" | "nohalf-cut" => bool_flag!(self.half_cut),
            "cut-mark" | "nocut-mark" => bool_flag!(self.cut_mark),
            "chain-printing" | "nochain-printing" => bool_flag!(self.chain_printing),
            "mirror-print" | "nomirror-print" => bool_flag!(self.mirror_print),
            "software-mirror" | "nosoftware-mirror" => bool_flag!(self.software_mirror),
            "label-preamble" | "nolabel-preamble" => bool_flag!(self.label_preamble),
            "label-recovery" | "nolabel-recovery" => bool_flag!(self.label_recovery),
            "last-page-flag" | "nolast-page-flag" => bool_flag!(self.last_page_flag),
            "legacy-hires" | "nolegacy-hires" => bool_flag!(self.legacy_hires),
            "concat-pages" | "noconcat-pages" => bool_flag!(self.concat_pages),
            "pt-series" | "nopt-series" => {
                let want = parse_bool_token(key, value)?;
                if want && self.ql_series {
                    return Err(ConfigError::new(
                        "pt-series",
                        ConfigReason::MutuallyExclusiveSeries,
                    ));
                }
                self.pt_series = want;
                return Ok(());
            }
            "ql-series" | "noql-series" => {
                let want = parse_bool_token(key, value)?;
                if want && self.pt_series {
                    return Err(ConfigError::new(
                        "ql-series",
                        ConfigReason::MutuallyExclusiveSeries,
                    ));
                }
                self.ql_series = want;
                return Ok(());
            }
            "transfer-mode" => {
                self.transfer_mode = match require_value(key, value)? {
                    "uncompressed-line" => TransferMode::UncompressedLine,
                    "run-length" => TransferMode::RunLength,
                    "bit-image" => TransferMode::BitImage,
                    other => {
                        return Err(ConfigError::new(
                            key,
                            ConfigReason::NotInEnumSet(
                                other.to_string(),
                                "uncompressed-line, run-length, bit-image".to_string(),
                            ),
                        ));
                    }
                };
            }
            "alignment" => {
                self.alignment = match require_value(key, value)? {
                    "right" => Alignment::Right,
                    "center" => Alignment::Center,
                    other => {
                        return Err(ConfigError::new(
                            key,
                            ConfigReason::NotInEnumSet(other.to_string(), "right, center".to_string()),
                        ));
                    }
                };
            }
            "media" => {
                self.media = match require_value(key, value)? {
                    "continuous-tape" => Media::ContinuousTape,
                    "die-cut-labels" => Media::DieCutLabels,
                    other => {
                        return Err(ConfigError::new(
                            key,
                            ConfigReason::NotInEnumSet(
                                other.to_string(),
                                "continuous-tape, die-cut-labels".to_string(),
                            ),
                        ));
                    }
                };
            }
            "bytes-per-line" => self.bytes_per_line = parse_int_range(key, value, 1, 255)? as u8,
            "cut-label" => self.cut_label = Some(parse_int_range(key, value, 0, 255)? as u8),
            "print-density" => self.print_density = parse_int_range(key, value, 0, 5)? as u8,
            "legacy-xfer-mode" => {
                self.legacy_xfer_mode = Some(parse_int_range(key, value, 0, 255)? as u8)
            }
            "xfer-mode" => self.xfer_mode = Some(parse_int_range(key, value, 0, 255)? as u8),
            "status-notification" => {
                self.status_notification = Some(parse_int_range(key, value, 0, 1)? as u8)
            }
            "min-margin" => self.min_margin = parse_float_range(key, value, 0.0, f64::MAX)?,
            "margin" => self.margin = parse_float_range(key, value, 0.0, f64::MAX)?,
            _ => return Err(ConfigError::new(key, ConfigReason::UnknownKey)),
        }
        Ok(())
    }
}

fn parse_bool_token(key: &str, value: Option<&str>) -> Result<bool, ConfigError> {
    let negated = key.starts_with("no");
    match value {
        None => Ok(!negated),
        Some(v) => {
            if negated {
                return Err(ConfigError::new(key, ConfigReason::NokeyNotBoolean));
            }
            match v {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                other => Err(ConfigError::new(key, ConfigReason::NotBoolean(other.to_string()))),
            }
        }
    }
}

fn require_value<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    value.ok_or_else(|| ConfigError::new(key, ConfigReason::NotInEnumSet(String::new(), String::new())))
}

fn parse_int_range(key: &str, value: Option<&str>, lo: i64, hi: i64) -> Result<i64, ConfigError> {
    let v = require_value(key, value)?;
    let n: i64 = v
        .parse()
        .map_err(|_| ConfigError::new(key, ConfigReason::NotInteger(v.to_string())))?;
    if n < lo || n > hi {
        return Err(ConfigError::new(key, ConfigReason::IntOutOfRange(n, lo, hi)));
    }
    Ok(n)
}

fn parse_float_range(key: &str, value: Option<&str>, lo: f64, hi: f64) -> Result<f64, ConfigError> {
    let v = require_value(key, value)?;
    let n: f64 = v
        .parse()
        .map_err(|_| ConfigError::new(key, ConfigReason::NotFloat(v.to_string())))?;
    if n < lo || n > hi {
        return Err(ConfigError::new(key, ConfigReason::FloatOutOfRange(n, lo, hi)));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_key_sets_boolean_true() {
        let mut opts = JobOptions::default();
        opts.apply("auto-cut").unwrap();
        assert!(opts.auto_cut);
    }

    #[test]
    fn no_prefixed_key_sets_boolean_false() {
        let mut opts = JobOptions::default();
        opts.apply("noquality-high").unwrap();
        assert!(!opts.quality_high);
    }

    #[test]
    fn explicit_boolean_value() {
        let mut opts = JobOptions::default();
        opts.apply("auto-cut=false").unwrap();
        assert!(!opts.auto_cut);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut opts = JobOptions::default();
        let err = opts.apply("not-a-real-key").unwrap_err();
        assert_eq!(err.reason, ConfigReason::UnknownKey);
    }

    #[test]
    fn pt_and_ql_series_are_mutually_exclusive() {
        let mut opts = JobOptions::default();
        assert!(opts.pt_series);
        let err = opts.apply("ql-series").unwrap_err();
        assert_eq!(err.reason, ConfigReason::MutuallyExclusiveSeries);
    }

    #[test]
    fn selecting_ql_series_after_disabling_pt_series() {
        let mut opts = JobOptions::default();
        opts.apply("nopt-series").unwrap();
        opts.apply("ql-series").unwrap();
        assert!(opts.ql_series);
        assert!(!opts.pt_series);
    }

    #[test]
    fn pt_series_after_ql_series_errors_symmetrically() {
        let mut opts = JobOptions::default();
        opts.apply("nopt-series").unwrap();
        opts.apply("ql-series").unwrap();
        let err = opts.apply("pt-series").unwrap_err();
        assert_eq!(err.reason, ConfigReason::MutuallyExclusiveSeries);
    }

    #[test]
    fn bytes_per_line_out_of_range_is_rejected() {
        let mut opts = JobOptions::default();
        let err = opts.apply("bytes-per-line=0").unwrap_err();
        assert_eq!(err.reason, ConfigReason::IntOutOfRange(0, 1, 255));
    }

    #[test]
    fn transfer_mode_enum_value() {
        let mut opts = JobOptions::default();
        opts.apply("transfer-mode=bit-image").unwrap();
        assert_eq!(opts.transfer_mode, TransferMode::BitImage);
    }

    #[test]
    fn transfer_mode_rejects_unknown_variant() {
        let mut opts = JobOptions::default();
        let err = opts.apply("transfer-mode=zigzag").unwrap_err();
        assert!(matches!(err.reason, ConfigReason::NotInEnumSet(..)));
    }

    #[test]
    fn min_margin_accepts_float() {
        let mut opts = JobOptions::default();
        opts.apply("min-margin=2.5").unwrap();
        assert_eq!(opts.min_margin, 2.5);
    }
}
