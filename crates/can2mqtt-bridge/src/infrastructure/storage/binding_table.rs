//! Binding-table loader.
//!
//! One binding per line, three comma-separated fields:
//!
//! ```text
//! # id, mode, topics
//! 0x100,uint162ascii,plant/level
//! 257,motor2ascii,drill/current&drill/speed&drill/state
//! ```
//!
//! Fields are trimmed.  Blank lines and lines starting with `#` are skipped.
//! The identifier is decimal or `0x`-prefixed hexadecimal.  Mode names are
//! not checked here; the registry resolves unknown names to `none`.

use std::path::Path;

use can2mqtt_core::BindingRecord;

use super::ConfigError;

/// Parses a CAN identifier written as decimal or `0x` hex.
///
/// ```rust
/// use can2mqtt_bridge::infrastructure::storage::binding_table::parse_frame_id;
///
/// assert_eq!(parse_frame_id("291"), Some(291));
/// assert_eq!(parse_frame_id("0x123"), Some(0x123));
/// assert_eq!(parse_frame_id("12a"), None);
/// ```
pub fn parse_frame_id(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Parses binding-table text into records, in file order.
///
/// # Errors
///
/// - [`ConfigError::Csv`] for a line without exactly three fields.
/// - [`ConfigError::InvalidFrameId`] for an identifier that is not a number.
///
/// Line numbers in errors are 1-based.
pub fn parse_binding_table(text: &str) -> Result<Vec<BindingRecord>, ConfigError> {
    let mut records = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let &[id, mode, topics] = fields.as_slice() else {
            return Err(ConfigError::Csv {
                line: line_no,
                reason: format!(
                    "expected 3 fields (id,mode,topics), found {}",
                    fields.len()
                ),
            });
        };

        let frame_id = parse_frame_id(id).ok_or_else(|| ConfigError::InvalidFrameId {
            line: line_no,
            value: id.to_string(),
        })?;
        records.push(BindingRecord::new(frame_id, mode, topics));
    }

    Ok(records)
}

/// Reads and parses a binding-table file.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_binding_table`].
pub fn load_binding_table(path: &Path) -> Result<Vec<BindingRecord>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_binding_table(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_records_in_order() {
        // Arrange
        let text = "100,uint162ascii,plant/level\n0x101,float2ascii,plant/temp&plant/temp2\n";

        // Act
        let records = parse_binding_table(text).unwrap();

        // Assert
        assert_eq!(
            records,
            vec![
                BindingRecord::new(100, "uint162ascii", "plant/level"),
                BindingRecord::new(0x101, "float2ascii", "plant/temp&plant/temp2"),
            ]
        );
    }

    #[test]
    fn test_skips_comments_and_blank_lines() {
        let text = "# header\n\n   \n1,none,a\n  # indented comment\n";
        assert_eq!(parse_binding_table(text).unwrap().len(), 1);
    }

    #[test]
    fn test_trims_fields_and_crlf() {
        let records = parse_binding_table(" 7 , uint82ascii , a/b \r\n").unwrap();
        assert_eq!(records, vec![BindingRecord::new(7, "uint82ascii", "a/b")]);
    }

    #[test]
    fn test_wrong_field_count_reports_line() {
        let err = parse_binding_table("1,none,a\n\n2,none\n").unwrap_err();
        match err {
            ConfigError::Csv { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("found 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_comma_in_topic_is_too_many_fields() {
        let err = parse_binding_table("1,none,a,b\n").unwrap_err();
        assert!(matches!(err, ConfigError::Csv { line: 1, .. }));
    }

    #[test]
    fn test_non_numeric_id_is_rejected() {
        let err = parse_binding_table("abc,none,a\n").unwrap_err();
        match err {
            ConfigError::InvalidFrameId { line, value } => {
                assert_eq!(line, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_id_is_rejected() {
        assert!(parse_binding_table("-1,none,a\n").is_err());
    }

    #[test]
    fn test_parse_frame_id_upper_case_prefix() {
        assert_eq!(parse_frame_id("0X7ff"), Some(0x7FF));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_binding_table(Path::new("/nonexistent/can2mqtt.csv")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
