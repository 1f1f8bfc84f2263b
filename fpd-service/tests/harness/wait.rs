use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll `predicate` until it holds or panic after `timeout`.
pub async fn wait_until(description: &str, timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return;
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {:?}: {}", timeout, description);
        }
        sleep(POLL_INTERVAL).await;
    }
}

pub async fn eventually(description: &str, predicate: impl FnMut() -> bool) {
    wait_until(description, EVENTUALLY_TIMEOUT, predicate).await;
}
