//! Minimal Server-Sent Events parsing for streaming completions.
//!
//! The chat completions endpoint emits `data: {...}` lines separated by
//! blank lines, terminated by the `data: [DONE]` sentinel. This parser
//! handles chunks that split lines at arbitrary byte boundaries and CRLF
//! line endings; `event:`/`id:` fields and comment lines are ignored since
//! the completions stream never carries meaning in them.

/// The end-of-stream sentinel payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incrementally parses SSE bytes, yielding `data:` payloads as lines
/// complete.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: String,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a chunk of bytes into the parser.
    ///
    /// Returns the data payloads of any lines completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        let mut payloads = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(payload) = data_payload(line) {
                    payloads.push(payload.to_string());
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        payloads
    }

    /// Flushes any trailing unterminated line when the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        data_payload(line).map(|p| p.to_string())
    }
}

/// Extracts the payload of a `data:` line, stripping the single optional
/// leading space after the colon.
fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_single_event() {
        let mut parser = SseLineParser::new();
        let payloads = parser.push(b"data: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}".to_string()]);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        let payloads = parser.push(b"lo\n\n");
        assert_eq!(payloads, vec!["hello".to_string()]);
    }

    #[test]
    fn crlf_and_no_space_variants() {
        let mut parser = SseLineParser::new();
        let payloads = parser.push(b"data:first\r\n\r\ndata: second\n");
        assert_eq!(payloads, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn non_data_lines_ignored() {
        let mut parser = SseLineParser::new();
        let payloads = parser.push(b": comment\nevent: message\ndata: x\n\n");
        assert_eq!(payloads, vec!["x".to_string()]);
    }

    #[test]
    fn done_sentinel_passes_through() {
        let mut parser = SseLineParser::new();
        let payloads = parser.push(b"data: [DONE]\n");
        assert_eq!(payloads, vec![DONE_SENTINEL.to_string()]);
    }

    #[test]
    fn flush_emits_trailing_line() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: trailing").is_empty());
        assert_eq!(parser.flush(), Some("trailing".to_string()));
        assert_eq!(parser.flush(), None);
    }
}
