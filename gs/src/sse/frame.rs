//! Frame extraction from raw SSE blocks

use tracing::debug;

const EVENT_PREFIX: &str = "event: ";
const DATA_MARKER: &str = "data: ";

/// One fully delimited `event:`/`data:` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event_type: String,
    pub raw_payload: String,
}

/// Parse a raw block (the text between two blank-line boundaries)
///
/// Blocks that don't start with an `event: ` line, or that carry no `data: `
/// marker after it, produce nothing. Keep-alive comments (`: ping`) fall into
/// the first case.
pub fn parse_frame(block: &str) -> Option<Frame> {
    let Some(rest) = block.strip_prefix(EVENT_PREFIX) else {
        debug!(block_len = block.len(), "parse_frame: no event line, ignoring block");
        return None;
    };

    let line_end = rest.find(['\r', '\n']).unwrap_or(rest.len());
    let event_type = rest[..line_end].trim_end();

    let Some(data_pos) = rest[line_end..].find(DATA_MARKER) else {
        debug!(%event_type, "parse_frame: no data marker, ignoring block");
        return None;
    };
    let payload = &rest[line_end + data_pos + DATA_MARKER.len()..];

    Some(Frame {
        event_type: event_type.to_string(),
        raw_payload: payload.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_basic() {
        let frame = parse_frame("event: status\ndata: {\"status\":\"x\"}").unwrap();
        assert_eq!(frame.event_type, "status");
        assert_eq!(frame.raw_payload, "{\"status\":\"x\"}");
    }

    #[test]
    fn test_parse_frame_crlf() {
        let frame = parse_frame("event: plan\r\ndata: {\"a\":1}  \r").unwrap();
        assert_eq!(frame.event_type, "plan");
        assert_eq!(frame.raw_payload, "{\"a\":1}");
    }

    #[test]
    fn test_parse_frame_requires_event_line_first() {
        assert!(parse_frame("data: {}\nevent: status").is_none());
        assert!(parse_frame(": ping - 2024-01-01 00:00:00").is_none());
        assert!(parse_frame("").is_none());
    }

    #[test]
    fn test_parse_frame_requires_data_marker() {
        assert!(parse_frame("event: done").is_none());
        assert!(parse_frame("event: done\nid: 4").is_none());
    }

    #[test]
    fn test_parse_frame_marker_is_searched_after_event_line() {
        // An event type that happens to contain the marker text is not payload
        let frame = parse_frame("event: weird data: x\ndata: 1").unwrap();
        assert_eq!(frame.event_type, "weird data: x");
        assert_eq!(frame.raw_payload, "1");
    }

    #[test]
    fn test_parse_frame_skips_intermediate_lines() {
        let frame = parse_frame("event: status\nid: 7\ndata: {\"status\":\"ok\"}").unwrap();
        assert_eq!(frame.raw_payload, "{\"status\":\"ok\"}");
    }
}
