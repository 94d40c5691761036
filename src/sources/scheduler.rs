use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Ticks longer than this are abandoned and logged; the next tick starts fresh.
const TICK_TIMEOUT: Duration = Duration::from_secs(30);

/// Work performed once per period by a polling adapter.
pub trait Periodic: Send + 'static {
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Run `task` every `period` until `token` is cancelled.
///
/// The first tick fires immediately. A tick that overruns delays the following one
/// instead of bunching up.
pub fn spawn_periodic<T: Periodic>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut task: T,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log_info!("{name} started (every {:?})", period);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log_info!("{name} shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            log_info!("{name} cancelled mid-tick");
                            break;
                        }
                        result = tokio::time::timeout(TICK_TIMEOUT, task.tick()) => {
                            if result.is_err() {
                                log_warn!("{name} tick timed out (> {:?})", TICK_TIMEOUT);
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);

    impl Periodic for Counter {
        fn tick(&mut self) -> impl Future<Output = ()> + Send {
            let count = Arc::clone(&self.0);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let handle = spawn_periodic(
            "counter",
            Duration::from_millis(10),
            token.clone(),
            Counter(Arc::clone(&count)),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();
        handle.await.unwrap();

        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
