use std::thread;
use std::time::Duration;

/// Pacing policy invoked around every protocol exchange.
///
/// The instrument needs time to chew on each command, and this client does not
/// poll `BUSY?` or `*OPC?` between writes. Instead the transport asks its
/// pacing policy to settle before each send and before the first read of a
/// query response. Swapping the policy replaces the waiting strategy without
/// touching the protocol sequencing.
pub trait Pacing: Send {
    /// Called immediately before a command line is written.
    fn before_send(&mut self, command: &str);

    /// Called after a query was sent, before the first read of its response.
    fn before_read(&mut self, command: &str);
}

/// Fixed sleep before every send and before the first read of a reply.
///
/// This mirrors the instrument's observed processing latency rather than its
/// actual busy state. TODO: replace the send delay with `*OPC?` busy-polling
/// once the completion semantics of that query are pinned down.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub send_delay: Duration,
    pub read_delay: Duration,
}

impl FixedDelay {
    pub fn new(send_delay: Duration, read_delay: Duration) -> Self {
        Self {
            send_delay,
            read_delay,
        }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            send_delay: Duration::from_millis(50),
            read_delay: Duration::from_millis(100),
        }
    }
}

impl Pacing for FixedDelay {
    fn before_send(&mut self, _command: &str) {
        thread::sleep(self.send_delay);
    }

    fn before_read(&mut self, _command: &str) {
        thread::sleep(self.read_delay);
    }
}

/// No-op pacing for tests and simulators that reply instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacing for NoDelay {
    fn before_send(&mut self, _command: &str) {}

    fn before_read(&mut self, _command: &str) {}
}
