//! HTTP client the leader uses to reach followers

use crate::common::wire::error_from_response;
use crate::common::Result;
use crate::metadata::replication::{Proposal, ProposeAck, ReplicaClient, TxnRef};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpReplicaClient {
    base: String,
    http: reqwest::Client,
}

impl HttpReplicaClient {
    /// `timeout` bounds connect + request; the replicator applies its own
    /// per-call deadline on top.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post_txn(&self, phase: &str, txn_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/internal/{}", self.base, phase))
            .json(&TxnRef {
                txn_id: txn_id.to_string(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    fn addr(&self) -> &str {
        &self.base
    }

    async fn propose(&self, proposal: &Proposal) -> Result<bool> {
        let resp = self
            .http
            .post(format!("{}/internal/propose", self.base))
            .json(proposal)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp.json::<ProposeAck>().await?.ack)
    }

    async fn commit(&self, txn_id: &str) -> Result<()> {
        self.post_txn("commit", txn_id).await
    }

    async fn abort(&self, txn_id: &str) -> Result<()> {
        self.post_txn("abort", txn_id).await
    }
}
