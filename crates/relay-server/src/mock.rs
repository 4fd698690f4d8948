//! In-memory packet sink for deterministic testing.
//!
//! Records every packet it accepts and can be scripted to fail upcoming sends.

use async_trait::async_trait;
use relay_core::{Packet, RelayError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::dispatch::PacketSink;

/// A sink that stores packets instead of writing to a socket.
///
/// # Example
/// ```
/// use relay_server::mock::MockSink;
/// let sink = MockSink::new();
/// sink.fail_next(1);
/// assert!(sink.received().is_empty());
/// ```
#[derive(Default)]
pub struct MockSink {
    received: Mutex<Vec<Packet>>,
    /// One entry per upcoming send: `true` means that attempt fails.
    script: Mutex<VecDeque<bool>>,
    attempts: Mutex<usize>,
    /// Successful sends left before the sink closes itself.
    close_after: Mutex<Option<usize>>,
    closed: AtomicBool,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` send attempts fail.
    pub fn fail_next(&self, n: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..n {
            script.push_back(true);
        }
    }

    /// Close the sink once `n` more packets have been accepted.
    pub fn close_after(&self, n: usize) {
        *self.close_after.lock().unwrap() = Some(n);
        if n == 0 {
            self.close();
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Packets accepted so far, in send order.
    pub fn received(&self) -> Vec<Packet> {
        self.received.lock().unwrap().clone()
    }

    /// Total send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl PacketSink for MockSink {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        let fail = self.script.lock().unwrap().pop_front().unwrap_or(false);
        if fail {
            return Err(RelayError::Send("scripted failure".into()));
        }
        self.received.lock().unwrap().push(packet.clone());
        let mut close_after = self.close_after.lock().unwrap();
        if let Some(left) = close_after.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.close();
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
