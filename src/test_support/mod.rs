//! Shared helpers for unit tests.

pub(crate) mod socket_guard;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::Sleeper;

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn delays(&self) -> Vec<Duration> {
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
