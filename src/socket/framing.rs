//! Console-side splitting of the outbound frame stream.
//!
//! Every frame the bridge sends ends with [`FRAME_TERMINATOR`] (`0x1F`):
//!
//! ```text
//! {"type":"update","data":{...}}\x1f{"type":"update","data":{...}}\x1f
//! ```
//!
//! A socket read can end anywhere inside a frame, so [`FrameSplitter`]
//! buffers the unterminated tail until the rest arrives.

use crate::constants::FRAME_TERMINATOR;

/// Incremental splitter for `0x1F`-terminated frames.
///
/// Feed bytes via [`FrameSplitter::feed`] and get back complete frames
/// (without the terminator). Incomplete data is buffered.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    /// Create a new splitter with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and extract all complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == FRAME_TERMINATOR) {
            let end = start + offset;
            frames.push(String::from_utf8_lossy(&self.buf[start..end]).into_owned());
            start = end + 1;
        }

        self.buf.drain(..start);
        frames
    }

    /// Returns true if the splitter has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.feed(b"{\"type\":\"update\",\"data\":{}}\x1f");
        assert_eq!(frames, vec![r#"{"type":"update","data":{}}"#.to_string()]);
        assert!(!splitter.has_partial());
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.feed(b"a\x1fb\x1fc\x1f");
        assert_eq!(frames, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.feed(b"{\"type\":\"adv").is_empty());
        assert!(splitter.has_partial());

        let frames = splitter.feed(b"ertise\"}\x1f{\"ty");
        assert_eq!(frames, vec![r#"{"type":"advertise"}"#.to_string()]);
        assert!(splitter.has_partial());

        let frames = splitter.feed(b"pe\":\"update\"}\x1f");
        assert_eq!(frames, vec![r#"{"type":"update"}"#.to_string()]);
        assert!(!splitter.has_partial());
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"first\x1fsecond\x1f";
        let mut splitter = FrameSplitter::new();
        let mut frames = Vec::new();
        for byte in input {
            frames.extend(splitter.feed(&[*byte]));
        }
        assert_eq!(frames, vec!["first", "second"]);
    }

    #[test]
    fn test_empty_frame() {
        let mut splitter = FrameSplitter::new();
        assert_eq!(splitter.feed(b"\x1f"), vec![String::new()]);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.feed(b"").is_empty());
        assert!(!splitter.has_partial());
    }
}
