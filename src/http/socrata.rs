//! Offset-paginated SoQL queries against a Socrata open-data portal

use super::fetch::FetchClient;
use crate::error::ApiError;
use crate::models::ProviderId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

/// Sub-daily XEMA measurements (one row per station, instant and variable)
pub const SUBDAILY_RESOURCE: &str = "nzvn-apee";
/// Daily XEMA statistics
pub const DAILY_RESOURCE: &str = "7bvh-jvq2";
/// XEMA station metadata
pub const STATIONS_RESOURCE: &str = "yqwd-vj5e";
/// XEMA variable metadata
pub const VARIABLES_RESOURCE: &str = "4fb2-n3yi";

/// A SoQL query; `limit` doubles as the page size when paginating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocrataQuery {
    pub select: Option<String>,
    pub where_clause: Option<String>,
    pub order: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl SocrataQuery {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            select: None,
            where_clause: None,
            order: None,
            limit,
            offset: 0,
        }
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn at_offset(&self, offset: usize) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }

    /// Percent-encoded `$select=..&$where=..` query string
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(select) = &self.select {
            params.push(("$select", select.clone()));
        }
        if let Some(clause) = &self.where_clause {
            params.push(("$where", clause.clone()));
        }
        if let Some(order) = &self.order {
            params.push(("$order", order.clone()));
        }
        params.push(("$limit", self.limit.to_string()));
        params.push(("$offset", self.offset.to_string()));

        params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Escape a string literal for interpolation into a `$where` clause
#[must_use]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Source of single result pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, resource_id: &str, query: &SocrataQuery)
    -> Result<Vec<Value>, ApiError>;
}

/// Fetch every page of `query`, stopping at the first short page.
///
/// Any failing page aborts the whole fetch with that page's error.
#[instrument(skip(fetcher, query), fields(page_size = query.limit))]
pub async fn fetch_all_pages<F: PageFetcher + ?Sized>(
    fetcher: &F,
    resource_id: &str,
    query: &SocrataQuery,
) -> Result<Vec<Value>, ApiError> {
    let page_size = query.limit;
    if page_size == 0 {
        return Err(ApiError::invalid_params("page size must be positive"));
    }

    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetcher
            .fetch_page(resource_id, &query.at_offset(offset))
            .await?;
        let received = page.len();
        rows.extend(page);
        debug!(
            "Page at offset {} returned {} rows ({} total)",
            offset,
            received,
            rows.len()
        );
        if received < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(rows)
}

/// Decode raw JSON rows into typed records
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, ApiError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| ApiError::provider_error(format!("unexpected row shape: {e}")))
        })
        .collect()
}

/// Socrata client for the Transparència Catalunya portal
#[derive(Debug, Clone)]
pub struct SocrataClient {
    fetch: FetchClient,
    base_url: String,
    app_token: Option<String>,
}

impl SocrataClient {
    #[must_use]
    pub fn new(fetch: FetchClient, base_url: impl Into<String>, app_token: Option<String>) -> Self {
        Self {
            fetch,
            base_url: base_url.into(),
            app_token,
        }
    }

    #[must_use]
    pub fn resource_url(&self, resource_id: &str, query: &SocrataQuery) -> String {
        format!(
            "{}/resource/{resource_id}.json?{}",
            self.base_url.trim_end_matches('/'),
            query.to_query_string()
        )
    }

    /// All pages of `query`, decoded
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        resource_id: &str,
        query: &SocrataQuery,
    ) -> Result<Vec<T>, ApiError> {
        decode_rows(fetch_all_pages(self, resource_id, query).await?)
    }

    /// A single page of `query`, decoded
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        resource_id: &str,
        query: &SocrataQuery,
    ) -> Result<Vec<T>, ApiError> {
        decode_rows(self.fetch_page(resource_id, query).await?)
    }
}

#[async_trait]
impl PageFetcher for SocrataClient {
    async fn fetch_page(
        &self,
        resource_id: &str,
        query: &SocrataQuery,
    ) -> Result<Vec<Value>, ApiError> {
        let url = self.resource_url(resource_id, query);
        let headers: Vec<(&'static str, String)> = self
            .app_token
            .iter()
            .map(|token| ("X-App-Token", token.clone()))
            .collect();
        let response = self
            .fetch
            .fetch_json::<Vec<Value>>(&url, &headers, ProviderId::XemaTransparencia)
            .await?;
        Ok(response.data)
    }
}
