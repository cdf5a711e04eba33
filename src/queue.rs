//! Bounded request queue between the input notification context and the
//! control loop.
//!
//! The producer side only ever sees a [`RequestSender`]; pushes and pops go
//! through a lock-free `ArrayQueue`, so the notification context never blocks
//! on the controller.

use crossbeam::queue::ArrayQueue;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::command::Command;
use crate::error::{MonitorError, MonitorResult};

/// What to do when a request arrives at a full queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep the queued requests, discard the incoming one
    DropNewest,
    /// Evict the oldest queued request to make room
    #[default]
    DropOldest,
}

struct Shared {
    queue: ArrayQueue<Command>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
    unknown: AtomicU64,
}

/// Consumer side, owned by the controller.
pub struct RequestQueue {
    shared: Arc<Shared>,
}

/// Producer handle for the input notification context.
#[derive(Clone)]
pub struct RequestSender {
    shared: Arc<Shared>,
}

impl RequestQueue {
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> MonitorResult<Self> {
        if capacity == 0 {
            return Err(MonitorError::Config(
                "request queue capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                queue: ArrayQueue::new(capacity),
                policy,
                dropped: AtomicU64::new(0),
                unknown: AtomicU64::new(0),
            }),
        })
    }

    pub fn sender(&self) -> RequestSender {
        RequestSender {
            shared: self.shared.clone(),
        }
    }

    pub fn pop(&self) -> Option<Command> {
        self.shared.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Requests lost to overflow since startup.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Input bytes that did not decode to a command.
    pub fn unknown_bytes(&self) -> u64 {
        self.shared.unknown.load(Ordering::Relaxed)
    }
}

impl RequestSender {
    /// Receive-complete hook: decodes one byte into zero or one request.
    ///
    /// Returns true when a request was queued.
    pub fn notify(&self, byte: u8) -> bool {
        match Command::from_byte(byte) {
            Ok(cmd) => self.submit(cmd),
            Err(e) => {
                self.shared.unknown.fetch_add(1, Ordering::Relaxed);
                warn!("ignoring input: {}", e);
                false
            }
        }
    }

    fn submit(&self, cmd: Command) -> bool {
        let shared = &self.shared;
        match shared.policy {
            OverflowPolicy::DropNewest => match shared.queue.push(cmd) {
                Ok(()) => true,
                Err(cmd) => {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("request queue full, dropped {:?}", cmd);
                    false
                }
            },
            OverflowPolicy::DropOldest => {
                if let Some(evicted) = shared.queue.force_push(cmd) {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("request queue full, evicted {:?}", evicted);
                }
                debug!("queued {:?}", cmd);
                true
            }
        }
    }
}
