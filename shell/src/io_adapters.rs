use std::io::{self, Read, Result as IoResult, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Readable end of a stage stream.
pub type Source = Box<dyn Read + Send>;

/// Writable end of a stage stream.
pub type Sink = Box<dyn Write + Send>;

/// Memory-backed writer for capturing output in tests.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: create writer and return (writer, handle).
    pub fn with_handle() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// The shell's own stdout or stderr, shared between pump threads.
///
/// Every write takes the lock, so output from concurrently finishing stages
/// interleaves at chunk granularity rather than byte granularity.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// A writer backed by memory, plus a handle to read what was written.
    pub fn with_handle() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let (mw, handle) = MemWriter::with_handle();
        (Self::new(mw), handle)
    }
}

impl Write for SharedWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(data)
    }

    fn write_all(&mut self, data: &[u8]) -> IoResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Reads everything captured by a [`MemWriter`] handle as text.
pub fn captured(handle: &Arc<Mutex<Vec<u8>>>) -> String {
    let buf = handle.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&buf).into_owned()
}
