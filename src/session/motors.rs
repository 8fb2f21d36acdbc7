//! Motor operations on top of the command queue.
//!
//! Axis arguments are 1-based; `None` addresses every axis.

use crate::protocol::Message;

use super::{Session, SessionError};

fn scoped(axis: Option<usize>, body: &str) -> String {
    match axis {
        Some(axis) => format!("{}:{}", axis, body),
        None => body.to_string(),
    }
}

impl Session {
    /// Move one axis to `position` relative to its home.
    ///
    /// The controller reads `N:-x` as a relative move, so targets below home
    /// are only reachable through [`Session::move_all`] or a relative move.
    pub async fn move_absolute(&self, axis: usize, position: f64) -> Result<Message, SessionError> {
        self.send(&format!("{}:{}", axis, position)).await
    }

    pub async fn move_relative(&self, axis: usize, steps: f64) -> Result<Message, SessionError> {
        let sign = if steps < 0.0 { '-' } else { '+' };
        self.send(&format!("{}:{}{}", axis, sign, steps.abs())).await
    }

    /// Move several axes at once, one target per axis starting at axis 1.
    pub async fn move_all(&self, positions: &[f64]) -> Result<Message, SessionError> {
        let text = positions
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.send(&text).await
    }

    pub async fn set_home(&self, axis: Option<usize>) -> Result<Message, SessionError> {
        self.send(&scoped(axis, "h")).await
    }

    pub async fn enable(&self, axis: Option<usize>) -> Result<Message, SessionError> {
        self.send(&scoped(axis, "on")).await
    }

    pub async fn disable(&self, axis: Option<usize>) -> Result<Message, SessionError> {
        self.send(&scoped(axis, "off")).await
    }

    /// Maximum speed in revolutions per second.
    pub async fn set_speed(&self, speed: f64) -> Result<Message, SessionError> {
        self.send(&format!("x{}", speed)).await
    }

    pub async fn set_acceleration(&self, acceleration: f64) -> Result<Message, SessionError> {
        self.send(&format!("a{}", acceleration)).await
    }

    /// Fraction of a revolution an axis backs off after hitting a limit switch.
    pub async fn set_limit_compensation(&self, ratio: f64) -> Result<Message, SessionError> {
        self.send(&format!("i{}", ratio)).await
    }

    /// Ask for positions and wait for the report. The state store is
    /// updated from it before this returns.
    pub async fn positions(&self, axis: Option<usize>) -> Result<Message, SessionError> {
        self.send(&scoped(axis, "p")).await
    }

    pub async fn limit_status(&self, axis: Option<usize>) -> Result<Message, SessionError> {
        self.send(&scoped(axis, "l")).await
    }

    pub async fn stop(&self, axis: Option<usize>) -> Result<(), SessionError> {
        self.send_immediate(&scoped(axis, "s")).await
    }

    pub async fn emergency_stop(&self, axis: Option<usize>) -> Result<(), SessionError> {
        self.send_immediate(&scoped(axis, "e")).await
    }

    /// Request a status report without waiting for it.
    pub async fn request_status(&self, axis: Option<usize>) -> Result<(), SessionError> {
        self.send_immediate(&scoped(axis, "d")).await
    }

    /// Poll status until every axis reports idle.
    ///
    /// The controller never announces that motion has settled, so this
    /// queues a status query, checks the store and sleeps between polls.
    pub async fn wait_for_idle(&self) -> Result<(), SessionError> {
        match self.settings().idle_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.poll_until_idle())
                .await
                .map_err(|_| SessionError::IdleTimeout)?,
            None => self.poll_until_idle().await,
        }
    }

    async fn poll_until_idle(&self) -> Result<(), SessionError> {
        let interval = self.settings().idle_poll_interval();
        let mut polls = 0u32;
        loop {
            self.send("d").await?;
            polls += 1;
            if self.shared.inner.lock().await.store.all_idle() {
                tracing::debug!("All axes idle after {} poll(s)", polls);
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }
}
