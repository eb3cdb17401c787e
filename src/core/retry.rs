use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
            exponential_base: 2.0,
        }
    }
}

pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut delay_ms = self.config.initial_delay_ms;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("{} succeeded after {} attempts", operation_name, attempt);
                    }
                    return Ok(result);
                },
                Err(err) => {
                    if attempt >= self.config.max_attempts {
                        error!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, err
                        );
                        return Err(err);
                    }

                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        operation_name, attempt, self.config.max_attempts, err, delay_ms
                    );

                    sleep(Duration::from_millis(delay_ms)).await;

                    delay_ms = ((delay_ms as f64) * self.config.exponential_base) as u64;
                    delay_ms = delay_ms.min(self.config.max_delay_ms);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let result: Result<i32, String> = policy.execute("op", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let policy = RetryPolicy::new(RetryConfig {
            initial_delay_ms: 1,
            ..Default::default()
        });
        let calls = AtomicU32::new(0);

        let result: Result<i32, String> = policy
            .execute("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            ..Default::default()
        });
        let calls = AtomicU32::new(0);

        let result: Result<i32, String> = policy
            .execute("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
