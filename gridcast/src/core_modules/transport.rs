// THEORY:
// The serial link is a collaborator, not part of the engine. `Transport` is
// the whole surface the engine needs from it: open/close, a connected
// predicate, one-shot writes and non-blocking line reads. Every call returns
// immediately; a write that cannot complete right away fails instead of
// stalling the frame loop. Partial-write recovery belongs to the
// implementation.
//
// `MemoryTransport` records writes and serves queued inbound lines. It backs
// the tests and the tester's dry-run mode.

use crate::error::TransportError;
use std::collections::VecDeque;

pub trait Transport {
    /// Opens the link at `baud_rate`. Opening an open link is a no-op.
    fn open(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Writes one complete payload.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Next complete inbound line without its terminator, or `None` if no full
    /// line has arrived yet.
    fn read_line(&mut self) -> Option<String>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).open(baud_rate)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read_line(&mut self) -> Option<String> {
        (**self).read_line()
    }
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    connected: bool,
    baud_rate: Option<u32>,
    inbound: VecDeque<String>,
    written: Vec<Vec<u8>>,
    fail_writes: bool,
}

impl MemoryTransport {
    /// A closed transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// An already open transport.
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Queues a line as if the device had printed it.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.inbound.push_back(line.into());
    }

    pub fn pending_lines(&self) -> usize {
        self.inbound.len()
    }

    /// Every successful write so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.written)
    }

    /// While set, writes fail with `TransportError::Rejected`.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.connected = true;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
        self.inbound.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes {
            return Err(TransportError::Rejected("simulated write failure".into()));
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> Option<String> {
        if !self.connected {
            return None;
        }
        self.inbound.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_require_an_open_link() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(
            transport.write(&[1, 2]),
            Err(TransportError::NotConnected)
        ));
        transport.open(9600).unwrap();
        transport.write(&[1, 2]).unwrap();
        assert_eq!(transport.written(), &[vec![1, 2]]);
        assert_eq!(transport.baud_rate(), Some(9600));
    }

    #[test]
    fn simulated_failures_are_not_recorded() {
        let mut transport = MemoryTransport::connected();
        transport.set_fail_writes(true);
        assert!(transport.write(&[0xFF]).is_err());
        assert!(transport.written().is_empty());
    }

    #[test]
    fn close_drops_pending_input() {
        let mut transport = MemoryTransport::connected();
        transport.push_line("READY");
        transport.close();
        assert!(!transport.is_connected());
        assert_eq!(transport.pending_lines(), 0);
        assert_eq!(transport.read_line(), None);
    }

    #[test]
    fn boxed_transport_forwards() {
        let mut transport: Box<dyn Transport> = Box::new(MemoryTransport::connected());
        assert!(transport.is_connected());
        transport.write(b"[]\n").unwrap();
        transport.close();
        assert!(!transport.is_connected());
    }
}
