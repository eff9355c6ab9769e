// THEORY:
// `SerialTransport` talks to the device through its tty node (for example
// `/dev/ttyACM0`), opened non-blocking and switched to raw mode at the
// configured baud rate.
//
// Writes never wait. Whatever the tty does not take right away is kept as the
// unsent tail of that payload and the write reports `WouldBlock`; the next
// write pushes the tail out first, so the device never sees a frame cut short
// and followed by the start of another. A write that cannot move the tail
// fails again without touching the new payload.
//
// Reads happen on a dedicated thread that splits the byte stream into lines
// and forwards them over a channel, so `read_line` on the frame loop only ever
// polls the channel. The thread polls the non-blocking fd and checks a stop
// flag between attempts; `close` raises the flag and joins it, which releases
// the device.

use crate::tty;
use gridcast::{MemoryTransport, Transport, TransportError};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sleep between reads while the device is silent.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

struct LineReader {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    lines: mpsc::UnboundedReceiver<String>,
    handle: JoinHandle<()>,
}

impl LineReader {
    fn spawn(port: File, device: String) -> Result<Self, TransportError> {
        let (tx, lines) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let thread_stop = Arc::clone(&stop);
        let thread_alive = Arc::clone(&alive);

        let handle = std::thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || {
                read_lines(port, &device, &thread_stop, &tx);
                thread_alive.store(false, Ordering::Relaxed);
                debug!(device = %device, "serial reader stopped");
            })?;

        Ok(Self {
            stop,
            alive,
            lines,
            handle,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("serial reader panicked");
        }
    }
}

fn read_lines(
    mut port: File,
    device: &str,
    stop: &AtomicBool,
    tx: &mpsc::UnboundedSender<String>,
) {
    let mut chunk = [0u8; 256];
    let mut partial = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut chunk) {
            Ok(0) => {
                info!(device, "serial device hung up");
                return;
            }
            Ok(read) => {
                partial.extend_from_slice(&chunk[..read]);
                while let Some(end) = partial.iter().position(|&byte| byte == b'\n') {
                    let raw: Vec<u8> = partial.drain(..=end).collect();
                    let line = String::from_utf8_lossy(&raw)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(READ_POLL_INTERVAL);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(device, %err, "serial read failed");
                return;
            }
        }
    }
}

/// Writes as much of `bytes` as the tty accepts right now.
fn write_available(port: &mut File, bytes: &[u8]) -> std::io::Result<usize> {
    let mut written = 0;
    while written < bytes.len() {
        match port.write(&bytes[written..]) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(count) => written += count,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(written)
}

pub struct SerialTransport {
    path: PathBuf,
    port: Option<File>,
    reader: Option<LineReader>,
    /// Unsent tail of the last payload.
    unsent: Vec<u8>,
}

impl SerialTransport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            port: None,
            reader: None,
            unsent: Vec::new(),
        }
    }

    /// Pushes out the tail of an earlier payload. `WouldBlock` while any of
    /// it is left.
    fn flush_unsent(&mut self, port: &mut File) -> Result<(), TransportError> {
        if self.unsent.is_empty() {
            return Ok(());
        }
        let written = write_available(port, &self.unsent)?;
        self.unsent.drain(..written);
        if self.unsent.is_empty() {
            Ok(())
        } else {
            Err(TransportError::WouldBlock)
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        let device = self.path.display().to_string();
        let port = tty::open_nonblocking(&self.path)?;
        if let Err(err) = tty::configure_raw(&port, baud_rate) {
            warn!(device = %device, baud_rate, %err, "cannot configure serial line");
            return Err(err.into());
        }
        self.reader = Some(LineReader::spawn(port.try_clone()?, device.clone())?);
        self.port = Some(port);
        self.unsent.clear();
        info!(device = %device, baud_rate, "serial device opened");
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
        self.unsent.clear();
        if let Some(reader) = self.reader.take() {
            reader.shutdown();
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some() && self.reader.as_ref().is_some_and(LineReader::is_alive)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut port = self.port.take().ok_or(TransportError::NotConnected)?;
        let result = self.flush_unsent(&mut port).and_then(|()| {
            let written = write_available(&mut port, bytes)?;
            if written == bytes.len() {
                return Ok(());
            }
            // A payload that never started is retried whole on a later tick.
            if written > 0 {
                self.unsent.extend_from_slice(&bytes[written..]);
            }
            Err(TransportError::WouldBlock)
        });
        self.port = Some(port);
        result
    }

    fn read_line(&mut self) -> Option<String> {
        self.reader.as_mut()?.lines.try_recv().ok()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// The link the tester drives: a real device, or an in-memory stand-in that
/// answers READY immediately and keeps every payload for display.
pub enum Link {
    Serial(SerialTransport),
    DryRun(MemoryTransport),
}

impl Link {
    pub fn serial(path: PathBuf) -> Self {
        Link::Serial(SerialTransport::new(path))
    }

    pub fn dry_run() -> Self {
        let mut memory = MemoryTransport::new();
        memory.push_line("READY");
        Link::DryRun(memory)
    }

    /// Payloads written since the last call. Always empty for a real device.
    pub fn take_dry_run_payloads(&mut self) -> Vec<Vec<u8>> {
        match self {
            Link::Serial(_) => Vec::new(),
            Link::DryRun(memory) => memory.take_written(),
        }
    }
}

impl Transport for Link {
    fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        match self {
            Link::Serial(serial) => serial.open(baud_rate),
            Link::DryRun(memory) => memory.open(baud_rate),
        }
    }

    fn close(&mut self) {
        match self {
            Link::Serial(serial) => serial.close(),
            Link::DryRun(memory) => memory.close(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Link::Serial(serial) => serial.is_connected(),
            Link::DryRun(memory) => memory.is_connected(),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Link::Serial(serial) => serial.write(bytes),
            Link::DryRun(memory) => memory.write(bytes),
        }
    }

    fn read_line(&mut self) -> Option<String> {
        match self {
            Link::Serial(serial) => serial.read_line(),
            Link::DryRun(memory) => memory.read_line(),
        }
    }
}
