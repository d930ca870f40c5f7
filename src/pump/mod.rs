//! Scheduling primitives for the upload queue.
//!
//! `Pump` runs an async handler to completion without ever overlapping
//! itself, while guaranteeing that a trigger received mid-run causes exactly
//! one more run. `RetryTimer` is the bounded-delay fallback that keeps the
//! queue making progress after silent failures.

pub mod timer;

pub use timer::RetryTimer;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

type Handler = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
struct PumpState {
    running: bool,
    rerun_requested: bool,
}

struct PumpInner {
    name: &'static str,
    handler: Handler,
    state: Mutex<PumpState>,
}

/// Reentrancy-safe task coalescer.
///
/// `start()` may be called from anywhere, including synchronously from
/// inside the handler itself. Execution always happens on a freshly spawned
/// task, never on the caller's stack, so a reentrant caller cannot race the
/// running/idle transition it just observed.
pub struct Pump {
    inner: Arc<PumpInner>,
}

impl Pump {
    pub fn new<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PumpInner {
                name,
                handler: Box::new(handler),
                state: Mutex::new(PumpState::default()),
            }),
        }
    }

    /// Request that the handler runs soon. Idempotent: triggers received
    /// while a run is in flight coalesce into a single follow-up run.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                state.rerun_requested = true;
                return;
            }
            state.running = true;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                if let Err(e) = (inner.handler)().await {
                    // A failed run must not wedge the pump; log and move on.
                    tracing::error!("pump '{}' handler failed: {e:#}", inner.name);
                }
                let mut state = inner.state.lock();
                if state.rerun_requested {
                    state.rerun_requested = false;
                } else {
                    state.running = false;
                    break;
                }
            }
        });
    }
}
