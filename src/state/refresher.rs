use crate::state::messages::SyncRequest;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Periodic league refresh — a pull-based stand-in for push subscriptions.
/// Every pull replaces the in-memory collections wholesale, so polling and
/// push-on-change are interchangeable from the store's point of view.
pub struct PeriodicRefresher {
    sync_requests: mpsc::Sender<SyncRequest>,
}

impl PeriodicRefresher {
    pub fn new(sync_requests: mpsc::Sender<SyncRequest>) -> Self {
        Self { sync_requests }
    }

    pub async fn run(self) {
        let mut pull_interval = interval(Duration::from_secs(60));
        // Skip the immediate first tick so startup loading isn't double-triggered.
        pull_interval.tick().await;

        loop {
            pull_interval.tick().await;
            if self.sync_requests.send(SyncRequest::PullAll).await.is_err() {
                break;
            }
        }
    }
}
