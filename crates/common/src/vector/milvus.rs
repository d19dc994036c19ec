//! Milvus REST v2 client.

use super::{IndexRow, SearchHit, VectorIndex, OUTPUT_FIELDS};
use super::{BUCKET_MAX_LENGTH, ENDPOINT_MAX_LENGTH, MINIO_PATH_MAX_LENGTH, SOURCE_MAX_LENGTH, TEXT_MAX_LENGTH};
use crate::config::VectorStoreConfig;
use crate::errors::{AppError, Result};
use crate::storage::Provenance;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Milvus collection store
pub struct MilvusIndex {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    nlist: u32,
    nprobe: u32,
}

/// Every v2 response is wrapped in `{code, message, data}`; code 0 is success
#[derive(Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct HasResponse {
    has: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResponse {
    insert_count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    row_count: usize,
}

#[derive(Deserialize)]
struct SearchRow {
    id: i64,
    distance: f32,
    #[serde(default)]
    text: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    minio_path: String,
    #[serde(default)]
    bucket: String,
    #[serde(default)]
    endpoint: String,
}

impl From<SearchRow> for SearchHit {
    fn from(row: SearchRow) -> Self {
        SearchHit {
            id: row.id,
            text: row.text,
            provenance: Provenance {
                source: row.source,
                minio_path: row.minio_path,
                bucket: row.bucket,
                endpoint: row.endpoint,
            },
            score: row.distance,
        }
    }
}

impl MilvusIndex {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            nlist: config.nlist,
            nprobe: config.nprobe,
        })
    }

    async fn call<T: DeserializeOwned>(&self, collection: &str, path: &str, body: Value) -> Result<T> {
        let url = format!("{}/v2/vectordb/{}", self.base_url, path);
        debug!(url = %url, collection = collection, "Milvus request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::index(collection, format!("{} request failed: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::index(collection, format!("{} returned {}: {}", path, status, text)));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| AppError::index(collection, format!("{} response unreadable: {}", path, e)))?;

        parse_envelope(collection, path, envelope)
    }

    fn schema(dimension: usize) -> Value {
        let varchar = |name: &str, max_length: usize| {
            json!({
                "fieldName": name,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": max_length }
            })
        };

        json!({
            "autoId": true,
            "enableDynamicField": false,
            "fields": [
                { "fieldName": "id", "dataType": "Int64", "isPrimary": true },
                {
                    "fieldName": "vector",
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": dimension }
                },
                varchar("text", TEXT_MAX_LENGTH),
                varchar("source", SOURCE_MAX_LENGTH),
                varchar("minio_path", MINIO_PATH_MAX_LENGTH),
                varchar("bucket", BUCKET_MAX_LENGTH),
                varchar("endpoint", ENDPOINT_MAX_LENGTH),
            ]
        })
    }
}

fn parse_envelope<T: DeserializeOwned>(collection: &str, path: &str, envelope: Envelope) -> Result<T> {
    if envelope.code != 0 {
        return Err(AppError::index(
            collection,
            format!("{} failed with code {}: {}", path, envelope.code, envelope.message),
        ));
    }

    serde_json::from_value(envelope.data)
        .map_err(|e| AppError::index(collection, format!("{} returned unexpected data: {}", path, e)))
}

#[async_trait]
impl VectorIndex for MilvusIndex {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        let response: HasResponse = self
            .call(name, "collections/has", json!({ "collectionName": name }))
            .await?;
        Ok(response.has)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let _: Value = self
            .call(name, "collections/drop", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let body = json!({
            "collectionName": name,
            "schema": Self::schema(dimension),
            "indexParams": [{
                "fieldName": "vector",
                "indexName": "vector",
                "metricType": "COSINE",
                "params": { "index_type": "IVF_FLAT", "nlist": self.nlist }
            }]
        });

        let _: Value = self.call(name, "collections/create", body).await?;
        Ok(())
    }

    async fn insert(&self, name: &str, rows: &[IndexRow]) -> Result<usize> {
        for row in rows {
            row.check_schema(name)?;
        }

        let response: InsertResponse = self
            .call(
                name,
                "entities/insert",
                json!({ "collectionName": name, "data": rows }),
            )
            .await?;
        Ok(response.insert_count)
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let body = json!({
            "collectionName": name,
            "data": [vector],
            "annsField": "vector",
            "limit": limit,
            "outputFields": OUTPUT_FIELDS,
            "searchParams": {
                "metricType": "COSINE",
                "params": { "nprobe": self.nprobe }
            }
        });

        let rows: Vec<SearchRow> = self.call(name, "entities/search", body).await?;
        Ok(rows.into_iter().map(SearchHit::from).collect())
    }

    async fn row_count(&self, name: &str) -> Result<usize> {
        let stats: StatsResponse = self
            .call(name, "collections/get_stats", json!({ "collectionName": name }))
            .await?;
        Ok(stats.row_count)
    }

    fn backend_name(&self) -> &str {
        "milvus"
    }
}
