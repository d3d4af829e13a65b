//! Block store contract and its HTTP client

use crate::blockstore::store::Block;
use crate::common::wire::{error_from_response, Answer};
use crate::common::{encode_path_segment, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Operations the metadata tier consumes from the block store
#[async_trait]
pub trait BlockStoreClient: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn has_block(&self, hash: &str) -> Result<bool>;
    /// Idempotent: storing a present hash succeeds without change
    async fn store_block(&self, block: &Block) -> Result<()>;
    async fn get_block(&self, hash: &str) -> Result<Option<Block>>;
}

/// Block store client over HTTP
#[derive(Clone)]
pub struct HttpBlockClient {
    base: String,
    http: reqwest::Client,
}

impl HttpBlockClient {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(base, http))
    }

    pub fn with_client(base: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// `hash` is escaped so malformed input cannot address another route
    fn block_url(&self, hash: &str) -> String {
        format!("{}/blocks/{}", self.base, encode_path_segment(hash))
    }
}

#[async_trait]
impl BlockStoreClient for HttpBlockClient {
    async fn ping(&self) -> Result<()> {
        let resp = self.http.get(format!("{}/ping", self.base)).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }

    async fn has_block(&self, hash: &str) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/exists", self.block_url(hash)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp.json::<Answer>().await?.answer)
    }

    async fn store_block(&self, block: &Block) -> Result<()> {
        let resp = self
            .http
            .put(self.block_url(&block.hash))
            .body(block.data.clone())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Block>> {
        let resp = self
            .http
            .get(self.block_url(hash))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let block = Block {
            hash: hash.to_string(),
            data: resp.bytes().await?,
        };
        block.verify()?;
        Ok(Some(block))
    }
}
