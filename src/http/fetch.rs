//! JSON fetch client with timeout, retry and failure classification

use crate::config::HttpConfig;
use crate::error::{ApiError, ApiErrorCode};
use crate::models::ProviderId;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Timeout and retry policy of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Hard limit for a single attempt
    pub timeout: Duration,
    /// Attempts after the first one
    pub retries: u32,
    /// Backoff base, doubled on every retry
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            retries: 2,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

impl From<&HttpConfig> for FetchOptions {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retries: config.retries,
            retry_delay: config.retry_delay(),
        }
    }
}

/// Decoded body plus whether an upstream cache served it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse<T> {
    pub data: T,
    pub cached: bool,
}

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

/// Map a non-success HTTP status to an error code, `None` for 2xx
#[must_use]
pub fn classify_status(status: u16) -> Option<ApiErrorCode> {
    match status {
        200..=299 => None,
        401 | 403 => Some(ApiErrorCode::InvalidApiKey),
        404 => Some(ApiErrorCode::NotFound),
        429 => Some(ApiErrorCode::RateLimited),
        500..=599 => Some(ApiErrorCode::ProviderError),
        _ => Some(ApiErrorCode::Unknown),
    }
}

fn is_cache_hit(headers: &HeaderMap) -> bool {
    ["x-cache", "cf-cache-status"].iter().any(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("HIT"))
    })
}

fn classify_transport(err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(format!("request timed out: {err}"))
    } else if err.is_decode() {
        ApiError::provider_error(format!("invalid JSON in response: {err}"))
    } else {
        ApiError::network(format!("network error: {err}"))
    }
}

/// Run `op` under the timeout and retry policy.
///
/// Every attempt gets a fresh timeout window and is dropped (cancelling any
/// in-flight request) when the window expires. Non-retryable codes return at
/// once; the last error is returned when all attempts fail.
pub async fn retry_with_backoff<T, F, Fut>(options: &FetchOptions, mut op: F) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        let error = match tokio::time::timeout(options.timeout, op(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => ApiError::timeout(format!(
                "request timed out after {} ms",
                options.timeout.as_millis()
            )),
        };

        if !error.is_retryable() {
            debug!("Not retrying {} error", error.code);
            return Err(error);
        }
        if attempt >= options.retries {
            warn!(
                "Giving up after {} attempts, last error: {}",
                attempt + 1,
                error
            );
            return Err(error);
        }

        let delay = backoff_delay(options.retry_delay, attempt);
        warn!(
            "Attempt {} failed ({}), retrying in {} ms",
            attempt + 1,
            error,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// HTTP client shared by every provider
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    options: FetchOptions,
}

impl FetchClient {
    pub fn new(options: FetchOptions) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("MeteoBCN/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    #[must_use]
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// GET `url` and decode the JSON body
    #[instrument(skip(self, headers), fields(provider = %provider))]
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        provider: ProviderId,
    ) -> Result<FetchResponse<T>, ApiError> {
        let start_time = Instant::now();
        debug!("GET {}", url);

        let result = retry_with_backoff(&self.options, move |_| async move {
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            let response = request.send().await.map_err(|e| classify_transport(&e))?;
            let status = response.status();
            if let Some(code) = classify_status(status.as_u16()) {
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(ApiError::new(code, format!("HTTP {status}: {snippet}"))
                    .with_detail("status", status.as_u16()));
            }

            let cached = is_cache_hit(response.headers());
            let data = response
                .json::<T>()
                .await
                .map_err(|e| classify_transport(&e))?;
            Ok(FetchResponse { data, cached })
        })
        .await
        .map_err(|e| e.with_provider(provider).with_detail("url", url));

        if result.is_ok() {
            info!(
                "Fetched {} in {:.3}s",
                url,
                start_time.elapsed().as_secs_f64()
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(retries: u32) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(200),
            retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[rstest]
    #[case(200, None)]
    #[case(204, None)]
    #[case(401, Some(ApiErrorCode::InvalidApiKey))]
    #[case(403, Some(ApiErrorCode::InvalidApiKey))]
    #[case(404, Some(ApiErrorCode::NotFound))]
    #[case(429, Some(ApiErrorCode::RateLimited))]
    #[case(500, Some(ApiErrorCode::ProviderError))]
    #[case(503, Some(ApiErrorCode::ProviderError))]
    #[case(400, Some(ApiErrorCode::Unknown))]
    #[case(418, Some(ApiErrorCode::Unknown))]
    fn test_classify_status(#[case] status: u16, #[case] expected: Option<ApiErrorCode>) {
        assert_eq!(classify_status(status), expected);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(4000));
    }

    #[test]
    fn test_cache_hit_headers() {
        let mut headers = HeaderMap::new();
        assert!(!is_cache_hit(&headers));
        headers.insert("cf-cache-status", "hit".parse().unwrap());
        assert!(is_cache_hit(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("x-cache", "MISS".parse().unwrap());
        assert!(!is_cache_hit(&headers));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_options(2), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ApiError::network("connection reset"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = retry_with_backoff(&fast_options(2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::new(ApiErrorCode::RateLimited, "slow down")) }
        })
        .await;
        assert_eq!(result.unwrap_err().code, ApiErrorCode::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[rstest]
    #[case(ApiErrorCode::MissingApiKey)]
    #[case(ApiErrorCode::InvalidApiKey)]
    #[case(ApiErrorCode::InvalidParams)]
    #[case(ApiErrorCode::NotFound)]
    #[tokio::test]
    async fn test_non_retryable_stops_immediately(#[case] code: ApiErrorCode) {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = retry_with_backoff(&fast_options(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ApiError::new(code, "no")) }
        })
        .await;
        assert_eq!(result.unwrap_err().code, code);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_classified() {
        let options = FetchOptions {
            timeout: Duration::from_millis(5),
            retries: 1,
            retry_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = retry_with_backoff(&options, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
        })
        .await;
        assert_eq!(result.unwrap_err().code, ApiErrorCode::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
