//! Shared helpers for integration tests.

pub mod socket_guard;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use unityscrape_core::Sleeper;

/// Sleeper that records requested delays and returns immediately.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[allow(dead_code)]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(delay);
    }
}
