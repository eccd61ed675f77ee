//! In-memory stand-in for a physical port, used by tests.

use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
    sync::{mpsc, Arc, Mutex},
    time::Duration,
};

use crate::error::ConnectionError;

use super::port::{DeviceInfo, OpenedPort, PortControl, PortProvider};

enum Inbound {
    Data(Vec<u8>),
    HangUp,
}

#[derive(Default)]
struct MockLine {
    inbound: Option<mpsc::Sender<Inbound>>,
    written: Vec<u8>,
    failures: VecDeque<ConnectionError>,
    fail_writes: bool,
    open_delay: Option<Duration>,
    opens: usize,
    closes: usize,
    readers_open: usize,
    readers_open_at_close: Vec<usize>,
}

/// Scriptable port provider. Every successful `request_port` opens a fresh line.
#[derive(Clone, Default)]
pub struct MockProvider {
    line: Arc<Mutex<MockLine>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next connect attempt.
    pub fn fail_next(&self, err: ConnectionError) {
        self.line.lock().unwrap().failures.push_back(err);
    }

    /// Make the next connect attempt take `delay` before the port opens.
    pub fn delay_next_open(&self, delay: Duration) {
        self.line.lock().unwrap().open_delay = Some(delay);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.line.lock().unwrap().fail_writes = fail;
    }

    /// Deliver bytes as if the board sent them.
    pub fn push(&self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        if let Some(tx) = self.line.lock().unwrap().inbound.as_ref() {
            let _ = tx.send(Inbound::Data(bytes.to_vec()));
        }
    }

    /// End the stream from the remote side.
    pub fn hang_up(&self) {
        if let Some(tx) = self.line.lock().unwrap().inbound.as_ref() {
            let _ = tx.send(Inbound::HangUp);
        }
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.line.lock().unwrap().written).into_owned()
    }

    pub fn opens(&self) -> usize {
        self.line.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.line.lock().unwrap().closes
    }

    /// For each close, how many readers of the line were still alive.
    pub fn readers_open_at_close(&self) -> Vec<usize> {
        self.line.lock().unwrap().readers_open_at_close.clone()
    }
}

impl PortProvider for MockProvider {
    fn request_port(&self, _baud_rate: u32) -> Result<OpenedPort, ConnectionError> {
        let delay = self.line.lock().unwrap().open_delay.take();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut line = self.line.lock().unwrap();
        if let Some(err) = line.failures.pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel();
        line.inbound = Some(tx);
        line.opens += 1;
        line.readers_open += 1;

        Ok(OpenedPort {
            info: DeviceInfo {
                port_name: format!("mock{}", line.opens),
                vendor_id: Some(0x2341),
                product_id: Some(0x0043),
            },
            reader: Box::new(MockReader {
                inbound: rx,
                leftover: Vec::new(),
                line: self.line.clone(),
            }),
            writer: Box::new(MockWriter {
                line: self.line.clone(),
            }),
            control: Box::new(MockControl {
                line: self.line.clone(),
            }),
        })
    }
}

struct MockReader {
    inbound: mpsc::Receiver<Inbound>,
    leftover: Vec<u8>,
    line: Arc<Mutex<MockLine>>,
}

impl Drop for MockReader {
    fn drop(&mut self) {
        if let Ok(mut line) = self.line.lock() {
            line.readers_open -= 1;
        }
    }
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.inbound.recv_timeout(Duration::from_millis(10)) {
                Ok(Inbound::Data(bytes)) => self.leftover = bytes,
                Ok(Inbound::HangUp) | Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(0),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(ErrorKind::TimedOut, "no data"))
                }
            }
        }

        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

struct MockWriter {
    line: Arc<Mutex<MockLine>>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut line = self.line.lock().unwrap();
        if line.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
        }
        line.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MockControl {
    line: Arc<Mutex<MockLine>>,
}

impl PortControl for MockControl {
    fn close(self: Box<Self>) -> io::Result<()> {
        let mut line = self.line.lock().unwrap();
        line.closes += 1;
        let readers_open = line.readers_open;
        line.readers_open_at_close.push(readers_open);
        line.inbound = None;
        Ok(())
    }
}
