//! CPU-side fences for frames in flight.
//!
//! wgpu has no fence object; completion is observed through
//! `Queue::on_submitted_work_done`, whose callback fires while the device is
//! polled. A [`FrameFence`] is armed when a frame is submitted and the
//! returned [`FenceSignal`] is moved into that callback.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// How long a waiter sleeps between device polls.
const PUMP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("timed out after {0:?} waiting for a frame fence")]
    Timeout(Duration),
    #[error("device poll failed: {0}")]
    Poll(String),
    #[error("a frame ring needs at least one slot")]
    EmptyRing,
}

#[derive(Debug, Default)]
struct FenceState {
    armed: u64,
    signaled: u64,
}

impl FenceState {
    fn is_signaled(&self) -> bool {
        self.signaled >= self.armed
    }
}

#[derive(Debug, Default)]
struct FenceInner {
    state: Mutex<FenceState>,
    cond: Condvar,
}

/// Reusable fence. Each [`FrameFence::arm`] starts a new epoch; waiting
/// returns once the latest epoch has been signaled. A fence that was never
/// armed counts as signaled.
#[derive(Clone, Debug, Default)]
pub struct FrameFence {
    inner: Arc<FenceInner>,
}

/// Completion handle for one armed epoch. `Send + 'static` so it can be moved
/// into GPU completion callbacks.
#[derive(Debug)]
pub struct FenceSignal {
    inner: Arc<FenceInner>,
    epoch: u64,
}

impl FenceSignal {
    pub fn signal(self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.signaled = state.signaled.max(self.epoch);
        self.inner.cond.notify_all();
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl FrameFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) -> FenceSignal {
        let mut state = self.lock();
        state.armed += 1;
        FenceSignal {
            inner: Arc::clone(&self.inner),
            epoch: state.armed,
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.lock().is_signaled()
    }

    /// Blocks until the latest epoch is signaled.
    ///
    /// `pump` runs before every check; on the GPU path it polls the device so
    /// completion callbacks get a chance to fire. `None` waits without a deadline.
    pub fn wait<P>(&self, mut pump: P, timeout: Option<Duration>) -> Result<(), SyncError>
    where
        P: FnMut() -> Result<(), SyncError>,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            pump()?;

            let state = self.lock();
            if state.is_signaled() {
                return Ok(());
            }
            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SyncError::Timeout(timeout.unwrap_or_default()));
                    }
                    PUMP_INTERVAL.min(deadline - now)
                }
                None => PUMP_INTERVAL,
            };
            let (state, _) = self
                .inner
                .cond
                .wait_timeout(state, sleep)
                .unwrap_or_else(PoisonError::into_inner);
            if state.is_signaled() {
                return Ok(());
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FenceState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pump for waits that only depend on other threads signaling.
pub fn no_pump() -> Result<(), SyncError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn unarmed_fence_is_signaled() {
        let fence = FrameFence::new();
        assert!(fence.is_signaled());
        fence.wait(no_pump, Some(Duration::ZERO)).unwrap();
    }

    #[test]
    fn armed_fence_times_out() {
        let fence = FrameFence::new();
        let _pending = fence.arm();
        let err = fence
            .wait(no_pump, Some(Duration::from_millis(5)))
            .unwrap_err();
        assert_eq!(err, SyncError::Timeout(Duration::from_millis(5)));
    }

    #[test]
    fn signal_from_another_thread_releases_the_waiter() {
        let fence = FrameFence::new();
        let signal = fence.arm();
        let signaled = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&signaled);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
            signal.signal();
        });

        fence.wait(no_pump, None).unwrap();
        assert!(signaled.load(Ordering::SeqCst));
        handle.join().unwrap();
    }

    #[test]
    fn stale_signal_does_not_release_a_newer_epoch() {
        let fence = FrameFence::new();
        let old = fence.arm();
        let _new = fence.arm();
        old.signal();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn pump_runs_and_can_signal() {
        let fence = FrameFence::new();
        let mut signal = Some(fence.arm());
        let mut pumps = 0;
        fence
            .wait(
                || {
                    pumps += 1;
                    if pumps == 3 {
                        if let Some(signal) = signal.take() {
                            signal.signal();
                        }
                    }
                    Ok(())
                },
                Some(Duration::from_secs(5)),
            )
            .unwrap();
        assert_eq!(pumps, 3);
    }

    #[test]
    fn pump_errors_abort_the_wait() {
        let fence = FrameFence::new();
        let _pending = fence.arm();
        let err = fence
            .wait(|| Err(SyncError::Poll("device lost".into())), None)
            .unwrap_err();
        assert_eq!(err, SyncError::Poll("device lost".into()));
    }
}
