use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Run `on_tick` every `period` for as long as `target` is alive.
///
/// The first tick fires one full period after spawning. A tick that comes due
/// while the previous one is still running is skipped, not queued.
pub(crate) fn spawn_interval<T, F, Fut>(target: Weak<T>, period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: FnMut(Arc<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                break;
            };
            on_tick(target).await;
        }
    })
}
