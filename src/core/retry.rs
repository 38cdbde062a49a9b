use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::transport::{HttpRequest, HttpResponse, Transport};

/// 重试策略
///
/// 默认 `backoff_multiplier = 1.0`，即每次重试前等待相同的时间。
/// 大于 1 时退化为指数退避，并受 `max_delay` 限制。
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    /// 首次失败之后最多再尝试的次数
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 添加抖动因子避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryStrategy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.retry_delay),
            max_delay: Duration::from_secs(config.retry_max_delay.max(config.retry_delay)),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.retry_jitter,
        }
    }

    pub fn should_retry(&self, error: &DownloadError, retry_count: u32) -> bool {
        retry_count < self.max_retries && error.is_retryable()
    }

    /// 第 `retry_count` 次重试（从 0 开始）之前的等待时间
    pub fn get_delay(&self, retry_count: u32) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();
        let base_secs = self.base_delay.as_secs_f64();
        let growth = self.backoff_multiplier.max(1.0).powi(retry_count.min(i32::MAX as u32) as i32);

        // 先在浮点域内截断到上限，倍数溢出为 inf 时直接取上限
        let delay_secs = if base_secs == 0.0 {
            0.0
        } else if growth.is_finite() {
            (base_secs * growth).min(max_secs)
        } else {
            max_secs
        };

        let jitter = if self.jitter_factor > 0.0 {
            delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5)
        } else {
            0.0
        };
        let final_delay = (delay_secs + jitter).clamp(0.0, max_secs);

        Duration::from_secs_f64(final_delay)
    }
}

/// 单次出站调用的重试预算，每次调用都新建，不在调用之间共享
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub retry_count: u32,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            retry_count: 0,
        }
    }

    pub fn should_retry(&self, error: &DownloadError) -> bool {
        self.strategy.should_retry(error, self.retry_count)
    }

    /// 记录一次重试并返回需要等待的时间
    pub fn record_retry(&mut self) -> Duration {
        let delay = self.strategy.get_delay(self.retry_count);
        self.retry_count += 1;
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.strategy.max_retries
    }
}

/// 为任意传输层加上有界重试：传输失败或非 2xx 状态码都会重试
pub struct RetryingTransport<T> {
    inner: T,
    strategy: RetryStrategy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, strategy: RetryStrategy) -> Self {
        Self { inner, strategy }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError> {
        let mut context = RetryContext::new(self.strategy.clone());
        loop {
            let error = match self.inner.send(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => DownloadError::HttpStatus {
                    status: response.status,
                    url: request.url.clone(),
                },
                Err(error) => error,
            };
            error!("请求失败: {}", error);

            if !context.should_retry(&error) {
                if error.is_retryable() && context.is_exhausted() {
                    return Err(DownloadError::MaxRetriesExceeded {
                        attempts: context.attempts(),
                        last: Box::new(error),
                    });
                }
                return Err(error);
            }

            let delay = context.record_retry();
            info!(
                "将在 {:.1} 秒后重试 ({}/{})",
                delay.as_secs_f64(),
                context.retry_count,
                context.strategy.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::testing::{ok_response, FakeTransport};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn instant_strategy(max_retries: u32) -> RetryStrategy {
        RetryStrategy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..RetryStrategy::default()
        }
    }

    #[test]
    fn test_constant_delay_by_default() {
        let strategy = RetryStrategy::default();
        assert_eq!(strategy.get_delay(0), Duration::from_secs(2));
        assert_eq!(strategy.get_delay(4), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let strategy = RetryStrategy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            ..RetryStrategy::default()
        };
        assert_eq!(strategy.get_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.get_delay(2), Duration::from_secs(4));
        assert_eq!(strategy.get_delay(8), Duration::from_secs(10));
    }

    #[test]
    fn test_huge_multiplier_is_capped_without_overflow() {
        let config = Config {
            backoff_multiplier: 1e10,
            max_retries: 40,
            retry_max_delay: 60,
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let strategy = RetryStrategy::from_config(&config);
        assert_eq!(strategy.get_delay(31), Duration::from_secs(60));
        assert_eq!(strategy.get_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_from_config_stays_within_bounds() {
        let config = Config {
            retry_delay: 10,
            retry_max_delay: 60,
            retry_jitter: 0.5,
            ..Config::default()
        };
        let strategy = RetryStrategy::from_config(&config);
        assert_eq!(strategy.jitter_factor, 0.5);
        for retry in 0..20 {
            let delay = strategy.get_delay(retry);
            assert!(delay >= Duration::from_millis(7_500) && delay <= Duration::from_millis(12_500));
        }
    }

    #[test]
    fn test_retry_context_budget() {
        let mut context = RetryContext::new(instant_strategy(2));
        let error = DownloadError::NetworkError("reset".into());
        assert!(context.should_retry(&error));
        context.record_retry();
        context.record_retry();
        assert!(!context.should_retry(&error));
        assert!(context.is_exhausted());
        assert_eq!(context.attempts(), 3);
    }

    #[tokio::test]
    async fn test_failing_transport_is_retried_exactly_max_retries_times() {
        let fake = Arc::new(
            FakeTransport::new().route("/always-down", |_| Err(DownloadError::NetworkError("refused".into()))),
        );
        let transport = RetryingTransport::new(fake.clone(), instant_strategy(3));

        let error = assert_err!(transport.send(HttpRequest::get("http://host/always-down")).await);
        match error {
            DownloadError::MaxRetriesExceeded { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, DownloadError::NetworkError(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fake.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_non_2xx_status_is_retried_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let fake = FakeTransport::new().route("/flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(crate::core::transport::HttpResponse::from_bytes(
                    502,
                    Default::default(),
                    bytes::Bytes::new(),
                    1,
                ))
            } else {
                Ok(ok_response(b"ok".to_vec()))
            }
        });
        let transport = RetryingTransport::new(fake, instant_strategy(5));

        let response = assert_ok!(transport.send(HttpRequest::get("http://host/flaky")).await);
        assert_eq!(response.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let fake = Arc::new(FakeTransport::new().route("/bad", |_| Err(DownloadError::MissingContentLength)));
        let transport = RetryingTransport::new(fake.clone(), instant_strategy(5));

        let error = assert_err!(transport.send(HttpRequest::get("http://host/bad")).await);
        assert!(matches!(error, DownloadError::MissingContentLength));
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_still_reports_exhaustion() {
        let fake = FakeTransport::new().route("/down", |_| Err(DownloadError::NetworkError("dns".into())));
        let transport = RetryingTransport::new(fake, instant_strategy(0));

        let error = assert_err!(transport.send(HttpRequest::get("http://host/down")).await);
        assert!(matches!(error, DownloadError::MaxRetriesExceeded { attempts: 1, .. }));
    }
}
