//! Reader for candump log files (`candump -L` / `candump -l` output).
//!
//! Each line holds one frame in compact notation, optionally preceded by a
//! timestamp and an interface name:
//!
//! ```text
//! (1436509052.249713) vcan0 100#002A
//! vcan0 12345678#DEADBEEF
//! 7FF#
//! 123#R
//! ```
//!
//! A three-digit identifier is a standard frame, eight digits an extended
//! one.  Remote frames (`#R`) are read as zero-length frames.  CAN FD frames
//! (`##`) are not supported.

use std::path::Path;

use can2mqtt_core::{CanFrame, CAN_EFF_MASK, CAN_MAX_DLEN};
use thiserror::Error;

/// A line that is not a candump frame.
#[derive(Debug, Error)]
pub enum CandumpError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
}

/// Parses one line.  Blank lines and `;`/`#` comments yield `Ok(None)`.
pub fn parse_candump_line(line: &str) -> Result<Option<CanFrame>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
        return Ok(None);
    }

    // The frame is always the last whitespace-separated token.
    let token = line
        .split_whitespace()
        .last()
        .ok_or_else(|| "empty line".to_string())?;
    let (id, data) = token
        .split_once('#')
        .ok_or_else(|| format!("{token:?} is not in <id>#<data> notation"))?;

    if data.starts_with('#') {
        return Err("CAN FD frames are not supported".to_string());
    }
    if id.is_empty() || id.len() > 8 {
        return Err(format!("invalid CAN identifier {id:?}"));
    }
    let id = u32::from_str_radix(id, 16)
        .ok()
        .filter(|&id| id <= CAN_EFF_MASK)
        .ok_or_else(|| format!("invalid CAN identifier {id:?}"))?;

    if data.starts_with('R') || data.starts_with('r') {
        return Ok(Some(CanFrame::new(id, &[])));
    }

    let bytes = hex::decode(data).map_err(|e| format!("invalid payload {data:?}: {e}"))?;
    if bytes.len() > CAN_MAX_DLEN {
        return Err(format!(
            "payload has {} bytes, a CAN frame holds at most {CAN_MAX_DLEN}",
            bytes.len()
        ));
    }
    Ok(Some(CanFrame::new(id, &bytes)))
}

/// Parses a whole log, in order.
///
/// # Errors
///
/// [`CandumpError::Syntax`] for the first malformed line (1-based).
pub fn parse_candump(text: &str) -> Result<Vec<CanFrame>, CandumpError> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        match parse_candump_line(line) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => {}
            Err(reason) => {
                return Err(CandumpError::Syntax {
                    line: index + 1,
                    reason,
                })
            }
        }
    }
    Ok(frames)
}

/// Reads and parses a candump log file.
pub fn load_candump(path: &Path) -> Result<Vec<CanFrame>, CandumpError> {
    let text = std::fs::read_to_string(path).map_err(|source| CandumpError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_candump(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_with_timestamp_and_interface() {
        let frame = parse_candump_line("(1436509052.249713) vcan0 100#002A")
            .unwrap()
            .unwrap();
        assert_eq!(frame, CanFrame::new(0x100, &[0x00, 0x2A]));
    }

    #[test]
    fn test_bare_frame() {
        let frame = parse_candump_line("12345678#DEADBEEF").unwrap().unwrap();
        assert_eq!(frame.id, 0x1234_5678);
        assert_eq!(frame.payload(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_empty_and_remote_frames() {
        assert_eq!(parse_candump_line("7FF#").unwrap().unwrap().len, 0);
        assert_eq!(parse_candump_line("123#R").unwrap().unwrap().len, 0);
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        assert!(parse_candump_line("").unwrap().is_none());
        assert!(parse_candump_line("; recorded on the test rig").unwrap().is_none());
    }

    #[test]
    fn test_rejects_odd_hex_payload() {
        assert!(parse_candump_line("100#ABC").is_err());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        assert!(parse_candump_line("100#000102030405060708").is_err());
    }

    #[test]
    fn test_rejects_fd_frames() {
        assert!(parse_candump_line("100##1AA").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_id() {
        assert!(parse_candump_line("FFFFFFFF#00").is_err());
    }

    #[test]
    fn test_parse_reports_line_number() {
        // Arrange
        let log = "100#01\n\nnot-a-frame\n";

        // Act
        let err = parse_candump(log).unwrap_err();

        // Assert
        assert!(matches!(err, CandumpError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_parse_keeps_order() {
        let frames = parse_candump("100#01\n(0.1) can0 200#02\n").unwrap();
        let ids: Vec<u32> = frames.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x100, 0x200]);
    }
}
