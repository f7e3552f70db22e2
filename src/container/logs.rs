//! Line-oriented reading of container log streams.

use std::collections::VecDeque;

use bollard::errors::Error as DockerError;
use futures::StreamExt;

use crate::engine::{LogStream, frame_bytes};

/// Splits a byte stream into lines; `\n` terminated, trailing `\r` dropped.
#[derive(Debug, Default)]
pub(crate) struct LineScanner {
    buf: Vec<u8>,
}

impl LineScanner {
    /// Feed bytes, returning every line completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Unterminated remainder at end of stream.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Log stream read one line at a time.
///
/// A frame is only pulled from the engine when every line of the previous
/// frame has been handed out.
pub(crate) struct LogLines {
    stream: LogStream,
    scanner: LineScanner,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl LogLines {
    pub(crate) fn new(stream: LogStream) -> Self {
        Self {
            stream,
            scanner: LineScanner::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next line, `None` once the stream has ended.
    pub(crate) async fn next_line(&mut self) -> Option<Result<String, DockerError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.exhausted {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(frame)) => {
                    let lines = self.scanner.push(&frame_bytes(frame));
                    self.pending.extend(lines);
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.scanner.finish());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bollard::container::LogOutput;
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_scanner_splits_across_frames() {
        let mut scanner = LineScanner::default();

        assert!(scanner.push(b"hel").is_empty());
        assert_eq!(scanner.push(b"lo\r\nwor"), vec!["hello".to_string()]);
        assert_eq!(scanner.push(b"ld\n\nx"), vec!["world".to_string(), String::new()]);
        assert_eq!(scanner.finish(), Some("x".to_string()));
        assert_eq!(scanner.finish(), None);
    }

    #[tokio::test]
    async fn test_log_lines_flushes_tail() {
        let frames: Vec<Result<LogOutput, DockerError>> = vec![
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"one\ntwo"),
            }),
            Ok(LogOutput::StdErr {
                message: Bytes::from_static(b" halves\nthree"),
            }),
        ];
        let mut lines = LogLines::new(Box::pin(futures::stream::iter(frames)));

        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await {
            seen.push(line.unwrap());
        }
        assert_eq!(seen, vec!["one", "two halves", "three"]);
    }
}
