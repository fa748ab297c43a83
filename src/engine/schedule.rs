use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a repeating task. Cancelling twice is harmless and dropping the
/// handle cancels the task.
#[derive(Debug)]
pub struct CancelHandle {
    task: JoinHandle<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Calls `callback` once per `interval`, starting one interval from now.
pub fn start_periodic_refresh<F>(interval: Duration, mut callback: F) -> CancelHandle
where
    F: FnMut() + Send + 'static,
{
    let period = interval.max(Duration::from_millis(1));
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            callback();
        }
    });
    CancelHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval() {
        let (count, callback) = counter();
        let handle = start_periodic_refresh(Duration::from_secs(300), callback);

        sleep(Duration::from_secs(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_final() {
        let (count, callback) = counter();
        let handle = start_periodic_refresh(Duration::from_secs(10), callback);

        sleep(Duration::from_secs(15)).await;
        handle.cancel();
        handle.cancel();
        sleep(Duration::from_secs(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let (count, callback) = counter();
        drop(start_periodic_refresh(Duration::from_secs(10), callback));

        sleep(Duration::from_secs(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
