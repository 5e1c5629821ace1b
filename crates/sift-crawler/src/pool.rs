use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no driver available within {0:?}")]
    Exhausted(Duration),

    #[error("driver init failed: {0}")]
    Init(String),
}

/// Bounded pool of expensive, stateful fetch handles.
///
/// Handles are created lazily up to `max_drivers` and live until
/// returned unhealthy; a destroyed handle frees its slot so a later
/// checkout can build a replacement. Total instances are bounded, not
/// healthy ones — a crashed handle never shrinks capacity for good.
pub struct DriverPool<D> {
    tx_idle: Sender<D>,
    rx_idle: Receiver<D>,
    live: Mutex<usize>,
    max_drivers: usize,
    factory: Box<dyn Fn() -> anyhow::Result<D> + Send + Sync>,
}

impl<D: Send> DriverPool<D> {
    pub fn new<F>(max_drivers: usize, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<D> + Send + Sync + 'static,
    {
        let (tx_idle, rx_idle) = bounded(max_drivers);
        Self {
            tx_idle,
            rx_idle,
            live: Mutex::new(0),
            max_drivers,
            factory: Box::new(factory),
        }
    }

    /// Blocks until a handle is idle or one can be created, up to
    /// `timeout`. Exhaustion is a capacity condition: callers should
    /// defer their work, not fail it.
    pub fn checkout(&self, timeout: Duration) -> Result<D, PoolError> {
        match self.rx_idle.try_recv() {
            Ok(driver) => return Ok(driver),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => (),
        }

        let can_create = {
            let mut live = self.live();
            if *live < self.max_drivers {
                *live += 1;
                true
            } else {
                false
            }
        };
        if can_create {
            return match (self.factory)() {
                Ok(driver) => Ok(driver),
                Err(e) => {
                    *self.live() -= 1;
                    Err(PoolError::Init(e.to_string()))
                }
            };
        }

        self.rx_idle
            .recv_timeout(timeout)
            .map_err(|_| PoolError::Exhausted(timeout))
    }

    /// Returns a handle. Unhealthy handles are dropped; their slot is
    /// refilled lazily by a later `checkout`.
    pub fn give_back(&self, driver: D, healthy: bool) {
        if healthy {
            if self.tx_idle.try_send(driver).is_err() {
                *self.live() -= 1;
            }
        } else {
            *self.live() -= 1;
            drop(driver);
        }
    }

    pub fn live_count(&self) -> usize {
        *self.live()
    }

    fn live(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}
