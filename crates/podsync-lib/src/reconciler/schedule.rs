//! Frame-paced flush timer
//!
//! Stands in for a display refresh callback: `schedule` arms a single
//! deadline one frame out, repeated calls while armed are ignored, and
//! `cancel` disarms it. Both are safe to call in any state.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

#[derive(Debug)]
pub struct FlushTimer {
    interval: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl FlushTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arm the timer; returns false if it was already armed
    pub fn schedule(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Box::pin(sleep(self.interval)));
        true
    }

    /// Disarm the timer; returns false if it was not armed
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes; pends forever while disarmed
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
