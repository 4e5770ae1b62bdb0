use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Clears an open submission's review flag once it has been on screen for the dwell time.
#[derive(Clone, Default)]
pub(crate) struct ReviewAutoClear {
    timers: Arc<Mutex<Timers>>,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    pending: HashMap<String, (u64, CancellationToken)>,
}

impl ReviewAutoClear {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the dwell timer, replacing any timer already running for the submission.
    pub(crate) fn schedule<F, Fut>(&self, submission_id: &str, dwell: Duration, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut timers = self.timers();
            timers.next_generation += 1;
            let generation = timers.next_generation;
            if let Some((_, previous)) =
                timers.pending.insert(submission_id.to_string(), (generation, token.clone()))
            {
                previous.cancel();
            }
            generation
        };

        let registry = self.clone();
        let submission_id = submission_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(submission_id = %submission_id, "Review auto-clear cancelled");
                }
                _ = tokio::time::sleep(dwell) => {
                    if registry.take_if_current(&submission_id, generation) {
                        tracing::debug!(submission_id = %submission_id, "Review auto-clear fired");
                        on_expire().await;
                    }
                }
            }
        });
    }

    /// Returns `true` when a pending timer was cancelled.
    pub(crate) fn cancel(&self, submission_id: &str) -> bool {
        match self.timers().pending.remove(submission_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self, submission_id: &str) -> bool {
        self.timers().pending.contains_key(submission_id)
    }

    fn take_if_current(&self, submission_id: &str, generation: u64) -> bool {
        let mut timers = self.timers();
        let current = timers
            .pending
            .get(submission_id)
            .map(|(pending_generation, _)| *pending_generation == generation)
            .unwrap_or(false);
        if current {
            timers.pending.remove(submission_id);
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::ReviewAutoClear;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_dwell_time() {
        let timers = ReviewAutoClear::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("s1", Duration::from_secs(5), counting(&fired));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_pending("s1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_clear() {
        let timers = ReviewAutoClear::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("s1", Duration::from_secs(5), counting(&fired));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(timers.cancel("s1"));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timers.cancel("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_restarts_the_timer() {
        let timers = ReviewAutoClear::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule("s1", Duration::from_secs(5), counting(&fired));
        tokio::time::sleep(Duration::from_secs(3)).await;
        timers.schedule("s1", Duration::from_secs(5), counting(&fired));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
