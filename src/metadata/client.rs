//! HTTP client for the metadata replica API

use crate::common::wire::{error_from_response, Answer};
use crate::common::{encode_filename, Result};
use crate::metadata::record::{FileRecord, WriteOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of `PUT /files/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub version: u64,
    #[serde(default)]
    pub blocklist: Vec<String>,
}

#[derive(Clone)]
pub struct MetadataClient {
    base: String,
    http: reqwest::Client,
}

impl MetadataClient {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn file_url(&self, filename: &str) -> String {
        format!("{}/files/{}", self.base, encode_filename(filename))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let resp = self.http.get(format!("{}/ping", self.base)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn read_file(&self, filename: &str) -> Result<FileRecord> {
        let resp = self.http.get(self.file_url(filename)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn modify_file(
        &self,
        filename: &str,
        version: u64,
        blocklist: Vec<String>,
    ) -> Result<WriteOutcome> {
        let resp = self
            .http
            .put(self.file_url(filename))
            .json(&ModifyRequest { version, blocklist })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn delete_file(&self, filename: &str, version: u64) -> Result<WriteOutcome> {
        let resp = self
            .http
            .delete(self.file_url(filename))
            .query(&[("version", version)])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn is_leader(&self) -> Result<bool> {
        let resp = self.http.get(format!("{}/leader", self.base)).send().await?;
        Ok(Self::check(resp).await?.json::<Answer>().await?.answer)
    }

    pub async fn crash(&self) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/admin/crash", self.base))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn restore(&self) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/admin/restore", self.base))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn is_crashed(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/admin/crashed", self.base))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json::<Answer>().await?.answer)
    }
}
