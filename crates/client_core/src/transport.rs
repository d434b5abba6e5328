use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{PurifierId, PurifierRecord},
    error::ApiError,
    protocol::{purifier_route, purifier_status_route, purifiers_route, StatusUpdate},
};
use tracing::debug;
use url::Url;

use crate::error::SyncError;

/// The remote collaborator holding the authoritative copy of the purifier collection.
#[async_trait]
pub trait RecordService: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<PurifierRecord>, SyncError>;
    async fn upsert(&self, record: &PurifierRecord) -> Result<PurifierRecord, SyncError>;
    async fn set_status(&self, id: &PurifierId, status: bool)
        -> Result<PurifierRecord, SyncError>;
    async fn replace(&self, record: &PurifierRecord) -> Result<PurifierRecord, SyncError>;
    async fn delete(&self, id: &PurifierId) -> Result<(), SyncError>;
}

pub struct HttpRecordService {
    http: Client,
    server_url: String,
}

impl HttpRecordService {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(server_url)
            .with_context(|| format!("invalid record service url '{server_url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("record service url must be http or https, got '{server_url}'");
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{route}", self.server_url)
    }
}

#[async_trait]
impl RecordService for HttpRecordService {
    async fn fetch_all(&self) -> Result<Vec<PurifierRecord>, SyncError> {
        let res = self.http.get(self.endpoint(purifiers_route())).send().await?;
        let records: Vec<PurifierRecord> = decode(res).await?;
        debug!(count = records.len(), "fetched purifiers from record service");
        Ok(records)
    }

    async fn upsert(&self, record: &PurifierRecord) -> Result<PurifierRecord, SyncError> {
        let res = self
            .http
            .post(self.endpoint(purifiers_route()))
            .json(record)
            .send()
            .await?;
        decode(res).await
    }

    async fn set_status(
        &self,
        id: &PurifierId,
        status: bool,
    ) -> Result<PurifierRecord, SyncError> {
        let res = self
            .http
            .patch(self.endpoint(&purifier_status_route(id)))
            .json(&StatusUpdate { status })
            .send()
            .await?;
        decode(res).await
    }

    async fn replace(&self, record: &PurifierRecord) -> Result<PurifierRecord, SyncError> {
        let res = self
            .http
            .put(self.endpoint(&purifier_route(&record.id)))
            .json(record)
            .send()
            .await?;
        decode(res).await
    }

    async fn delete(&self, id: &PurifierId) -> Result<(), SyncError> {
        let res = self
            .http
            .delete(self.endpoint(&purifier_route(id)))
            .send()
            .await?;
        ensure_success(res).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, SyncError> {
    let res = ensure_success(res).await?;
    Ok(res.json::<T>().await?)
}

async fn ensure_success(res: Response) -> Result<Response, SyncError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => (Some(api_error.code), api_error.message),
        Err(_) => (None, body),
    };
    Err(SyncError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
