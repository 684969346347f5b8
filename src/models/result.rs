//! Provider result envelope

use super::station::ProviderId;
use crate::error::ApiError;
use serde::Serialize;

/// Outcome of one orchestrated operation.
///
/// Exactly one of `data` and `error` is present; the constructors are the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderResult<T> {
    data: Option<T>,
    error: Option<ApiError>,
    provider: ProviderId,
    cached: bool,
}

impl<T> ProviderResult<T> {
    pub fn success(data: T, provider: ProviderId, cached: bool) -> Self {
        Self {
            data: Some(data),
            error: None,
            provider,
            cached,
        }
    }

    pub fn failure(error: ApiError, provider: ProviderId) -> Self {
        Self {
            data: None,
            error: Some(error),
            provider,
            cached: false,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Provider that served the data, or the last one tried on failure
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProviderResult<U> {
        ProviderResult {
            data: self.data.map(f),
            error: self.error,
            provider: self.provider,
            cached: self.cached,
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ApiError::provider_error("empty provider result")
                .with_provider(self.provider)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorCode;

    #[test]
    fn test_success_has_no_error() {
        let result = ProviderResult::success(vec![1, 2], ProviderId::Mock, true);
        assert!(result.is_success());
        assert!(result.error().is_none());
        assert!(result.cached());
        assert_eq!(result.into_result().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_failure_has_no_data() {
        let result: ProviderResult<Vec<u8>> =
            ProviderResult::failure(ApiError::timeout("slow"), ProviderId::Meteocat);
        assert!(result.data().is_none());
        assert_eq!(result.provider(), ProviderId::Meteocat);
        assert_eq!(result.into_result().unwrap_err().code, ApiErrorCode::Timeout);
    }
}
