//! Bounded retry with capped exponential backoff and optional jitter.

use std::time::Duration;

use rand::{thread_rng, Rng};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl RetryConfig {
    /// `attempts` tries in total, `delay` apart, no jitter.
    pub fn fixed(attempts: usize, delay: Duration) -> Self {
        Self { max_retries: attempts.saturating_sub(1), base_delay: delay, max_delay: delay, jitter: 0.0 }
    }

    pub fn attempts(&self) -> usize { self.max_retries + 1 }

    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        let delay = exp.min(self.max_delay);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter.min(1.0)) as i64;
        let offset = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

pub async fn retry_async<F, Fut, T, E>(cfg: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= cfg.max_retries => return Err(e),
            Err(_) => {
                let delay = cfg.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
