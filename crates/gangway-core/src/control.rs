//! Inbound control messages carried on text frames.
//!
//! A text frame is either a small JSON control structure or literal
//! keystroke input. Parsing is an attempt-to-decode: anything that is not
//! a well-formed control message (including truncated near-JSON) is
//! treated as literal input by the caller, so an interactive shell never
//! loses typed text to an over-eager parser.

use serde::Deserialize;

/// Raw wire shape of a control message.
#[derive(Debug, Deserialize)]
struct RawControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    rows: Option<u64>,
    #[serde(default)]
    cols: Option<u64>,
}

/// A recognized control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Geometry change request. Dimensions are raw wire values; the
    /// session validates them before applying.
    Resize { rows: u64, cols: u64 },
}

/// Attempt to parse a text frame as a control message.
///
/// Returns `None` when the text is not valid JSON, carries an unknown
/// `type` tag, or is missing the fields the tag requires; the caller
/// forwards such frames to the terminal as literal input.
pub fn parse_control(text: &str) -> Option<ControlMessage> {
    let raw: RawControl = serde_json::from_str(text).ok()?;
    match raw.kind.as_str() {
        "resize" => {
            let rows = raw.rows?;
            let cols = raw.cols?;
            Some(ControlMessage::Resize { rows, cols })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_parses() {
        assert_eq!(
            parse_control(r#"{"type":"resize","rows":40,"cols":120}"#),
            Some(ControlMessage::Resize {
                rows: 40,
                cols: 120
            })
        );
    }

    #[test]
    fn unknown_tag_is_literal_input() {
        assert_eq!(parse_control(r#"{"type":"ping"}"#), None);
    }

    #[test]
    fn missing_dimensions_is_literal_input() {
        assert_eq!(parse_control(r#"{"type":"resize","rows":40}"#), None);
    }

    // Truncated near-JSON is deliberately forwarded as keystrokes rather
    // than rejected; a client that garbles a control frame sees it echoed
    // by the shell instead of silently dropped.
    #[test]
    fn truncated_json_is_literal_input() {
        assert_eq!(parse_control(r#"{"type":"resize","rows":40,"co"#), None);
        assert_eq!(parse_control("ls -la\n"), None);
        assert_eq!(parse_control(""), None);
    }

    #[test]
    fn oversized_dimensions_still_parse() {
        // Range enforcement happens at apply time, not parse time.
        assert_eq!(
            parse_control(r#"{"type":"resize","rows":9999,"cols":1}"#),
            Some(ControlMessage::Resize { rows: 9999, cols: 1 })
        );
    }
}
