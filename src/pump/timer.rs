use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancellable single-shot delayed callback with restart semantics:
/// starting an already-pending timer is a no-op (the deadline is not reset).
///
/// The uploader keeps one of these armed whenever undelivered documents may
/// exist, so a silently failed attempt is always retried.
pub struct RetryTimer {
    delay: Duration,
    jitter: bool,
    callback: Arc<dyn Fn() + Send + Sync>,
    pending: Arc<Mutex<Option<CancellationToken>>>,
}

impl RetryTimer {
    pub fn new<F>(delay: Duration, jitter: bool, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay,
            jitter,
            callback: Arc::new(callback),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Schedule the callback after the configured delay, unless a timer is
    /// already pending.
    pub fn start(&self) {
        let token = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *pending = Some(token.clone());
            token
        };

        let delay = self.effective_delay();
        let pending = Arc::clone(&self.pending);
        let callback = Arc::clone(&self.callback);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    *pending.lock() = None;
                    callback();
                }
            }
        });
    }

    /// Cancel a pending timer, if any. A cancel that races the deadline may
    /// still observe one final callback.
    pub fn cancel(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            Duration::from_millis((self.delay.as_millis() as f64 * factor) as u64)
        } else {
            self.delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            RetryTimer::new(Duration::from_secs(60), false, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        timer.start();
        assert!(timer.is_pending());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_pending_does_not_reset_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            RetryTimer::new(Duration::from_secs(60), false, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        timer.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        timer.start(); // no-op, original deadline stands
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            RetryTimer::new(Duration::from_secs(60), false, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        timer.start();
        timer.cancel();
        assert!(!timer.is_pending());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_pending_timer_is_a_noop() {
        let timer = RetryTimer::new(Duration::from_secs(60), false, || {});
        timer.cancel();
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn restartable_after_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = {
            let fired = Arc::clone(&fired);
            RetryTimer::new(Duration::from_secs(60), false, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        timer.start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        timer.start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
