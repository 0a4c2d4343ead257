//! Wall-clock countdown for the time-boxed chat session.
//!
//! The expiry callback lives in a slot that can be swapped without
//! restarting the countdown, and each `start` bumps an epoch so a stale
//! ticker from a previous activation can never decrement or fire.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::{task::JoinHandle, time};

pub type ExpireCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct Countdown {
    inner: Arc<Mutex<CountdownInner>>,
}

#[derive(Default)]
struct CountdownInner {
    remaining: u64,
    active: bool,
    fired: bool,
    epoch: u64,
    on_expire: Option<ExpireCallback>,
    ticker: Option<JoinHandle<()>>,
}

fn lock(inner: &Mutex<CountdownInner>) -> MutexGuard<'_, CountdownInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins (or restarts) the countdown. The callback fires exactly once,
    /// on the 1→0 transition, then the countdown auto-stops.
    pub fn start(&self, duration_seconds: u64, on_expire: ExpireCallback) {
        let mut inner = lock(&self.inner);
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
        inner.epoch += 1;
        inner.remaining = duration_seconds;
        inner.active = true;
        inner.fired = false;
        inner.on_expire = Some(on_expire);

        let epoch = inner.epoch;
        let shared = Arc::clone(&self.inner);
        inner.ticker = Some(tokio::spawn(tick_loop(shared, epoch)));
    }

    /// Swaps the expiry callback without restarting the countdown. A later
    /// expiry invokes the latest installed callback.
    pub fn set_on_expire(&self, on_expire: ExpireCallback) {
        let mut inner = lock(&self.inner);
        inner.on_expire = Some(on_expire);
    }

    /// Guarantees the callback will not fire after this returns.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        inner.active = false;
        inner.epoch += 1;
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
    }

    pub fn remaining(&self) -> u64 {
        lock(&self.inner).remaining
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).active
    }
}

async fn tick_loop(inner: Arc<Mutex<CountdownInner>>, epoch: u64) {
    let mut interval = time::interval_at(
        time::Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    loop {
        interval.tick().await;
        let callback = {
            let mut guard = lock(&inner);
            if guard.epoch != epoch || !guard.active {
                return;
            }
            guard.remaining = guard.remaining.saturating_sub(1);
            if guard.remaining > 0 {
                None
            } else {
                guard.active = false;
                if guard.fired {
                    return;
                }
                guard.fired = true;
                guard.on_expire.clone()
            }
        };
        if let Some(callback) = callback {
            callback();
            return;
        }
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
