//! Remote data API.
//!
//! [`RemoteApi`] is the narrow interface the orchestrator consumes. The
//! production implementation, [`SupabaseClient`], talks to PostgREST.

use std::future::Future;
use std::time::Duration;

use crate::config::SupabaseConfig;
use crate::model::{EntityType, Record};

/// Request timeout for every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote backend failure.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// No URL or key configured; no request was attempted.
    #[error("Supabase is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("realtime channel: {0}")]
    Realtime(String),
}

/// Remote system of record.
///
/// Implementations must be cheap to share; the orchestrator holds one
/// behind an `Arc` for its whole lifetime.
pub trait RemoteApi: Send + Sync {
    /// Whether credentials are present. Checked before every session.
    fn is_configured(&self) -> bool;

    /// Insert or replace a record by id.
    fn upsert(
        &self,
        entity_type: EntityType,
        record: &Record,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Delete a record by id. Deleting an absent id succeeds.
    fn delete(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Full snapshot of active records of a type.
    fn select_active(
        &self,
        entity_type: EntityType,
    ) -> impl Future<Output = Result<Vec<Record>, RemoteError>> + Send;

    /// One record by id, active or not.
    fn fetch_one(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> impl Future<Output = Result<Option<Record>, RemoteError>> + Send;
}

/// PostgREST client for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    configured: bool,
}

impl SupabaseClient {
    /// Build a client. An unconfigured client is valid; it rejects every sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            configured: config.is_configured(),
        })
    }

    fn table_url(&self, entity_type: EntityType) -> String {
        format!("{}/rest/v1/{}", self.base_url, entity_type.table())
    }

    fn request(&self, method: reqwest::Method, entity_type: EntityType) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(entity_type))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    fn ensure_configured(&self) -> Result<(), RemoteError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(RemoteError::NotConfigured)
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode_records(response: reqwest::Response) -> Result<Vec<Record>, RemoteError> {
    response
        .json::<Vec<Record>>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

impl RemoteApi for SupabaseClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn upsert(&self, entity_type: EntityType, record: &Record) -> Result<(), RemoteError> {
        self.ensure_configured()?;
        let response = self
            .request(reqwest::Method::POST, entity_type)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        self.ensure_configured()?;
        let response = self
            .request(reqwest::Method::DELETE, entity_type)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn select_active(&self, entity_type: EntityType) -> Result<Vec<Record>, RemoteError> {
        self.ensure_configured()?;
        let response = self
            .request(reqwest::Method::GET, entity_type)
            .query(&[("select", "*"), ("is_active", "eq.true")])
            .send()
            .await?;
        decode_records(check(response).await?).await
    }

    async fn fetch_one(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>, RemoteError> {
        self.ensure_configured()?;
        let response = self
            .request(reqwest::Method::GET, entity_type)
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await?;
        Ok(decode_records(check(response).await?).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> SupabaseConfig {
        SupabaseConfig {
            url: url.to_string(),
            anon_key: key.to_string(),
        }
    }

    #[test]
    fn test_is_configured_requires_url_and_key() {
        assert!(SupabaseClient::new(&config("https://x.supabase.co", "k")).unwrap().is_configured());
        assert!(!SupabaseClient::new(&config("", "k")).unwrap().is_configured());
        assert!(!SupabaseClient::new(&config("https://x.supabase.co", "")).unwrap().is_configured());
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        let client = SupabaseClient::new(&config("https://x.supabase.co/", "k")).unwrap();
        assert_eq!(
            client.table_url(EntityType::Credits),
            "https://x.supabase.co/rest/v1/credits"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_makes_no_request() {
        let client = SupabaseClient::new(&config("", "")).unwrap();
        let err = client.select_active(EntityType::Debtors).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured));
    }
}
