/// Bounded output capture
///
/// Generators can print a lot (progress bars, pip logs). Each stream is
/// drained completely so the child never blocks on a full pipe, but only the
/// last `limit` bytes are retained: the tail is where tracebacks end up.
use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::thread::{self, JoinHandle};

/// Captured contents of one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    /// Earlier bytes were discarded to stay within the limit
    pub truncated: bool,
    pub total_bytes: usize,
}

impl CapturedStream {
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Ring buffer that keeps the most recent `limit` bytes
#[derive(Debug)]
pub struct TailBuffer {
    buffer: VecDeque<u8>,
    limit: usize,
    truncated: bool,
    total_bytes: usize,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(limit.min(64 * 1024)),
            limit,
            truncated: false,
            total_bytes: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.total_bytes += chunk.len();
        if self.limit == 0 {
            self.truncated |= !chunk.is_empty();
            return;
        }

        let chunk = if chunk.len() > self.limit {
            self.truncated = true;
            &chunk[chunk.len() - self.limit..]
        } else {
            chunk
        };

        let overflow = (self.buffer.len() + chunk.len()).saturating_sub(self.limit);
        if overflow > 0 {
            self.buffer.drain(..overflow);
            self.truncated = true;
        }
        self.buffer.extend(chunk);
    }

    pub fn finish(self) -> CapturedStream {
        CapturedStream {
            data: self.buffer.into_iter().collect(),
            truncated: self.truncated,
            total_bytes: self.total_bytes,
        }
    }
}

/// Drain a stream to EOF, keeping its tail
pub fn collect_tail<R: Read>(stream: R, limit: usize) -> CapturedStream {
    let mut reader = BufReader::new(stream);
    let mut tail = TailBuffer::new(limit);
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => tail.push(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Output stream closed with error: {}", e);
                break;
            }
        }
    }

    tail.finish()
}

/// Collect a stream on a background thread
pub fn spawn_tail_reader<R: Read + Send + 'static>(
    stream: Option<R>,
    limit: usize,
) -> Option<JoinHandle<CapturedStream>> {
    stream.map(|s| thread::spawn(move || collect_tail(s, limit)))
}

/// Join a reader thread; a panicked or absent reader yields empty output
pub fn join_reader(handle: Option<JoinHandle<CapturedStream>>) -> CapturedStream {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_output_is_complete() {
        let captured = collect_tail(&b"hello world"[..], 64);
        assert_eq!(captured.to_string_lossy(), "hello world");
        assert!(!captured.truncated);
        assert_eq!(captured.total_bytes, 11);
    }

    #[test]
    fn test_large_output_keeps_tail() {
        let mut input = "x".repeat(10_000);
        input.push_str("Traceback: boom");
        let captured = collect_tail(input.as_bytes(), 15);
        assert_eq!(captured.to_string_lossy(), "Traceback: boom");
        assert!(captured.truncated);
        assert_eq!(captured.total_bytes, 10_015);
    }

    #[test]
    fn test_tail_buffer_across_chunks() {
        let mut tail = TailBuffer::new(4);
        tail.push(b"abc");
        tail.push(b"def");
        let captured = tail.finish();
        assert_eq!(captured.data, b"cdef");
        assert!(captured.truncated);
    }

    #[test]
    fn test_absent_stream_joins_to_empty() {
        let handle = spawn_tail_reader::<&'static [u8]>(None, 16);
        assert_eq!(join_reader(handle), CapturedStream::default());
    }
}
