use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancellable settle timer.
///
/// Each call to [`Debouncer::settle`] supersedes the previous one: the earlier
/// waiter wakes up with `false` and only the most recent caller sees `true`
/// once the delay elapses without another trigger.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Pending>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct Pending {
    generation: u64,
    token: Option<CancellationToken>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self::with_shutdown(delay, CancellationToken::new())
    }

    /// Ties the debouncer to a parent token; cancelling it aborts any pending wait.
    pub fn with_shutdown(delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            delay,
            pending: Mutex::new(Pending::default()),
            shutdown,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn settle(&self) -> bool {
        let token = self.shutdown.child_token();
        let generation = {
            let mut slot = self.lock();
            if let Some(previous) = slot.token.replace(token.clone()) {
                previous.cancel();
            }
            slot.generation += 1;
            slot.generation
        };

        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => {
                let mut slot = self.lock();
                if slot.generation == generation {
                    slot.token = None;
                }
                !token.is_cancelled()
            }
        }
    }

    /// Drops whatever is waiting without starting a new wait.
    pub fn cancel(&self) {
        if let Some(previous) = self.lock().token.take() {
            previous.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
