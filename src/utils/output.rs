/// Bounded output collection
///
/// Readers keep the first `limit` bytes of a stream and keep draining (and
/// discarding) the rest, so a chatty child never blocks on a full pipe.
use crossbeam_channel::{bounded, Receiver};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Per-stream output caps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLimits {
    /// Stdout cap (bytes)
    pub stdout_limit: usize,
    /// Stderr cap (bytes)
    pub stderr_limit: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 10_000,
            stderr_limit: 8_000,
        }
    }
}

/// Bytes captured from one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    /// More bytes arrived than the cap allowed
    pub truncated: bool,
    /// Bytes seen on the stream, kept or not
    pub total_bytes: u64,
}

impl CapturedStream {
    fn trim_if_truncated(&mut self) {
        if self.truncated {
            trim_partial_char(&mut self.data);
        }
    }
}

/// Drop a multi-byte UTF-8 sequence the cap cut short.
fn trim_partial_char(data: &mut Vec<u8>) {
    let len = data.len();
    for back in 1..=len.min(3) {
        let byte = data[len - back];
        // Continuation bytes are 0b10xxxxxx.
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        if width > back {
            data.truncate(len - back);
        }
        return;
    }
}

/// Handle to a background reader thread
pub struct StreamCollector {
    buffer: Arc<Mutex<CapturedStream>>,
    done: Receiver<()>,
}

impl StreamCollector {
    /// Start draining `stream` on a dedicated thread.
    pub fn spawn<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let buffer = Arc::new(Mutex::new(CapturedStream::default()));
        let (done_tx, done) = bounded(1);

        let shared = Arc::clone(&buffer);
        thread::spawn(move || {
            collect_stream(stream, limit, &shared);
            let _ = done_tx.send(());
        });

        Self { buffer, done }
    }

    /// Wait up to `grace` for EOF, then return whatever was captured.
    ///
    /// EOF can be delayed indefinitely by a descendant that escaped the
    /// process group and still holds the pipe; in that case the partial
    /// buffer is returned marked as truncated and the reader is left to
    /// finish on its own.
    pub fn finish(self, grace: Duration) -> CapturedStream {
        let reached_eof = self.done.recv_timeout(grace).is_ok();
        let mut guard = match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut captured = std::mem::take(&mut *guard);
        if !reached_eof {
            log::warn!("Output stream still open after child exit; returning partial capture");
            captured.truncated = true;
        }
        captured.trim_if_truncated();
        captured
    }
}

fn collect_stream<R: Read>(mut stream: R, limit: usize, buffer: &Mutex<CapturedStream>) {
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = match buffer.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                captured.total_bytes += n as u64;
                let room = limit.saturating_sub(captured.data.len());
                if n > room {
                    captured.truncated = true;
                }
                let keep = n.min(room);
                captured.data.extend_from_slice(&chunk[..keep]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Output stream read error: {}", e);
                break;
            }
        }
    }
}

/// Drain an already-finished reader synchronously (used by tests and tools).
pub fn read_capped<R: Read>(stream: R, limit: usize) -> CapturedStream {
    let buffer = Mutex::new(CapturedStream::default());
    collect_stream(stream, limit, &buffer);
    let mut captured = buffer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    captured.trim_if_truncated();
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_output_limits_default() {
        let limits = OutputLimits::default();
        assert_eq!(limits.stdout_limit, 10_000);
        assert_eq!(limits.stderr_limit, 8_000);
    }

    #[test]
    fn small_stream_is_complete() {
        let captured = read_capped(Cursor::new(b"hello\n".to_vec()), 64);
        assert_eq!(captured.data, b"hello\n");
        assert!(!captured.truncated);
        assert_eq!(captured.total_bytes, 6);
    }

    #[test]
    fn large_stream_is_truncated_but_fully_drained() {
        let input = vec![b'x'; 50_000];
        let captured = read_capped(Cursor::new(input), 10_000);
        assert_eq!(captured.data.len(), 10_000);
        assert!(captured.truncated);
        assert_eq!(captured.total_bytes, 50_000);
    }

    #[test]
    fn exact_limit_is_not_truncated() {
        let captured = read_capped(Cursor::new(vec![b'y'; 128]), 128);
        assert_eq!(captured.data.len(), 128);
        assert!(!captured.truncated);
    }

    #[test]
    fn collector_thread_returns_after_eof() {
        let collector = StreamCollector::spawn(Cursor::new(b"abc".to_vec()), 2);
        let captured = collector.finish(Duration::from_secs(5));
        assert_eq!(captured.data, b"ab");
        assert!(captured.truncated);
    }

    #[test]
    fn cap_never_splits_a_character() {
        // "é" is two bytes; a 2-byte cap lands inside it.
        let captured = read_capped(Cursor::new("aé!".as_bytes().to_vec()), 2);
        assert_eq!(captured.data, b"a");
        assert!(captured.truncated);

        let rocket = "🚀🚀".as_bytes().to_vec();
        for cap in 5..8 {
            let captured = read_capped(Cursor::new(rocket.clone()), cap);
            assert_eq!(captured.data, "🚀".as_bytes(), "cap {}", cap);
        }
    }

    #[test]
    fn complete_tail_and_binary_output_are_kept() {
        let captured = read_capped(Cursor::new("é🚀xyz".as_bytes().to_vec()), 6);
        assert_eq!(captured.data, "é🚀".as_bytes());

        let captured = read_capped(Cursor::new(vec![0x80, 0x80, 0x80, 0x80, 0xFF]), 4);
        assert_eq!(captured.data, vec![0x80, 0x80, 0x80, 0x80]);

        // Untruncated output is never trimmed.
        let captured = read_capped(Cursor::new(vec![b'a', 0xC3]), 16);
        assert_eq!(captured.data, vec![b'a', 0xC3]);
    }
}
