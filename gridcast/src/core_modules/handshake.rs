// THEORY:
// The device announces that it is ready to receive frames by printing a line
// containing `READY`. Until then nothing is sent. The reader pulls at most one
// line per tick so the frame loop never waits on the port, and once the token
// has been seen it stops looking at line content altogether. Only a link
// teardown puts it back into the waiting state.
//
// There is no timeout: if the device never says READY, the pipeline keeps
// rendering and keeps waiting.

use crate::core_modules::transport::Transport;
use tracing::{info, trace};

pub const READY_TOKEN: &str = "READY";

#[derive(Debug, Default, Clone)]
pub struct HandshakeReader {
    ready: bool,
}

impl HandshakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Reads one pending line, if any. Returns `true` only on the call that
    /// flips the flag.
    pub fn poll<T: Transport + ?Sized>(&mut self, transport: &mut T) -> bool {
        if !transport.is_connected() {
            return false;
        }
        match transport.read_line() {
            Some(line) => self.observe_line(&line),
            None => false,
        }
    }

    /// Feeds one inbound line. Returns `true` only on the false -> true transition.
    pub fn observe_line(&mut self, line: &str) -> bool {
        if self.ready {
            return false;
        }
        if line.contains(READY_TOKEN) {
            self.ready = true;
            info!("device reported READY, starting data stream");
            return true;
        }
        trace!(line, "ignoring inbound line");
        false
    }

    /// Back to waiting for the token. Called on link teardown.
    pub fn reset(&mut self) {
        self.ready = false;
    }
}
