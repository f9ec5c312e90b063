//! Admission control for heavy transforms.
//!
//! A counting semaphore bounds how many detector/segmentation calls run at
//! once. The permit moves into the blocking task that does the work, so a
//! slot is released exactly when that work ends: on success, on error, on
//! panic, and also when the awaiting request is dropped or times out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// A held gate slot. Dropping it frees the slot.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_gate_in_flight(now);
    }
}

/// Bounded-capacity gate for heavy work.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    acquire_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
}

impl ConcurrencyGate {
    /// Gate with `capacity` slots and no timeouts.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            acquire_timeout: None,
            call_timeout: None,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.max_concurrent_transforms)
            .with_acquire_timeout(config.gate_timeout)
            .with_call_timeout(config.heavy_timeout)
    }

    /// Bound the wait for a free slot.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Bound how long a caller waits on work that already holds a slot.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> MediaResult<GatePermit> {
        let started = Instant::now();
        let acquire = Arc::clone(&self.semaphore).acquire_owned();

        let permit = match self.acquire_timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        capacity = self.capacity,
                        timeout_secs = limit.as_secs(),
                        "Concurrency gate saturated, rejecting"
                    );
                    metrics::record_gate_rejection("timeout");
                    return Err(MediaError::GateTimeout(limit.as_secs()));
                }
            },
            None => acquire.await,
        }
        .map_err(|_| {
            metrics::record_gate_rejection("closed");
            MediaError::GateClosed
        })?;

        let waited = started.elapsed();
        metrics::record_gate_wait(waited.as_secs_f64());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_gate_in_flight(now);
        debug!(
            wait_ms = waited.as_millis() as u64,
            in_flight = now,
            capacity = self.capacity,
            "Acquired gate slot"
        );

        Ok(GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Run `work` on the blocking pool while holding a slot.
    ///
    /// With a call timeout set, the caller gets [`MediaError::Timeout`] once
    /// it elapses, but the slot stays held until `work` actually returns so
    /// capacity is never over-committed.
    pub async fn run_blocking<F, T>(&self, work: F) -> MediaResult<T>
    where
        F: FnOnce() -> MediaResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });

        let joined = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                warn!(timeout_secs = limit.as_secs(), "Heavy transform exceeded time limit");
                MediaError::Timeout(limit.as_secs())
            })?,
            None => handle.await,
        };

        joined.map_err(|e| MediaError::internal(format!("Blocking task join error: {e}")))?
    }
}
