//! Vector index collaborator: namespaced upsert and top-K similarity query.
//!
//! Two implementations of [`VectorIndex`]:
//! - **[`PineconeIndex`]** — calls a hosted Pinecone-style REST index.
//! - **[`MemoryVectorIndex`]** — process-local brute-force cosine search,
//!   used by tests and offline runs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::VectorConfig;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, VectorMatch, VectorRecord};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records in the namespace.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;

    /// Return the `top_k` nearest records by cosine similarity, with
    /// metadata, ordered by descending score.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete every record in the namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

// ============ Pinecone REST ============

/// Hosted vector index spoken to over the Pinecone data-plane REST API.
/// Requires the `PINECONE_API_KEY` environment variable.
pub struct PineconeIndex {
    host: String,
    timeout_secs: u64,
}

impl PineconeIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let host = config
            .index_host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector.index_host required for pinecone provider"))?;
        if std::env::var("PINECONE_API_KEY").is_err() {
            bail!("PINECONE_API_KEY environment variable not set");
        }
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY not set"))?;

        let resp = self
            .client()?
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            bail!("Vector index error {}: {}", status, body_text);
        }

        Ok(resp.json().await?)
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<ChunkMetadata>,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        let body = serde_json::json!({
            "vectors": records,
            "namespace": namespace,
        });
        self.post("/vectors/upsert", body).await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });
        let json = self.post("/query", body).await?;
        let parsed: QueryResponse = serde_json::from_value(json)?;
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let body = serde_json::json!({
            "deleteAll": true,
            "namespace": namespace,
        });
        self.post("/vectors/delete", body).await?;
        Ok(())
    }
}

// ============ In-memory ============

/// In-memory index for tests and offline runs. Brute-force cosine over all
/// stored vectors in the namespace.
#[derive(Default)]
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        let stored = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().unwrap();
        let stored = match namespaces.get(namespace) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: Some(r.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().unwrap().remove(namespace);
        Ok(())
    }
}

/// Create the configured [`VectorIndex`].
pub fn create_vector_index(config: &VectorConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "memory" => Ok(Box::new(MemoryVectorIndex::new())),
        "pinecone" => Ok(Box::new(PineconeIndex::new(config)?)),
        other => bail!("Unknown vector provider: {}", other),
    }
}
