//! CRM access gateway.
//!
//! The engine only talks to the CRM through [`CrmGateway`], so the HTTP
//! client can be swapped for an in-memory fake in tests. Implementations
//! own authentication and rate-limit retries; callers only see `Result`s.

pub mod http;

use crate::entities::{Entity, FilterGroup, SearchPage, SearchQuery};
use crate::errors::Result;
use async_trait::async_trait;
use tracing::debug;

pub use http::HttpCrmGateway;

/// Maximum ids the CRM accepts in a single batch read.
pub const MAX_BATCH_SIZE: usize = 100;

/// Capabilities the engine needs from a CRM.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Fetches one page of records matching `query`.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// Returns the exact number of records matching `filters`.
    async fn count(&self, object_type: &str, filters: &[FilterGroup]) -> Result<u64>;

    /// Fetches records by id. `ids` must not exceed the batch limit; use
    /// [`fetch_in_chunks`] for longer lists.
    async fn batch_get_by_ids(
        &self,
        object_type: &str,
        ids: &[String],
        properties: &[String],
    ) -> Result<Vec<Entity>>;

    /// Fetches a single record, `None` if it does not exist.
    async fn get_by_id(
        &self,
        object_type: &str,
        id: &str,
        properties: &[String],
    ) -> Result<Option<Entity>>;

    /// Lists ids of `to_type` records associated with record `id`.
    async fn associated_ids(&self, from_type: &str, id: &str, to_type: &str) -> Result<Vec<String>>;
}

/// Batch-reads any number of ids, `chunk_size` ids per call.
///
/// Chunks are fetched one after another and the results concatenated in
/// chunk order. The first failing chunk aborts the whole fetch.
///
/// # Errors
/// Propagates the gateway error of the first failing chunk.
pub async fn fetch_in_chunks(
    gateway: &dyn CrmGateway,
    object_type: &str,
    ids: &[String],
    properties: &[String],
    chunk_size: usize,
) -> Result<Vec<Entity>> {
    let chunk_size = chunk_size.clamp(1, MAX_BATCH_SIZE);
    let mut records = Vec::with_capacity(ids.len());
    for (index, chunk) in ids.chunks(chunk_size).enumerate() {
        debug!(
            "Batch read {} chunk {} ({} ids)",
            object_type,
            index,
            chunk.len()
        );
        let mut batch = gateway
            .batch_get_by_ids(object_type, chunk, properties)
            .await?;
        records.append(&mut batch);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeCrm, contact};

    #[tokio::test]
    async fn test_fetch_in_chunks_splits_at_batch_limit() -> Result<()> {
        let crm = FakeCrm::new();
        let ids: Vec<String> = (0..250).map(|i| format!("c{i}")).collect();
        crm.add_records(
            "contacts",
            ids.iter().map(|id| contact(id, "Affiliate", "North")).collect(),
        )
        .await;

        let records = fetch_in_chunks(&crm, "contacts", &ids, &[], 100).await?;

        assert_eq!(records.len(), 250);
        assert_eq!(crm.batch_sizes().await, vec![100, 100, 50]);
        assert_eq!(records[0].id, "c0");
        assert_eq!(records[249].id, "c249");
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_in_chunks_caps_oversized_chunk() -> Result<()> {
        let crm = FakeCrm::new();
        let ids: Vec<String> = (0..150).map(|i| format!("c{i}")).collect();
        crm.add_records(
            "contacts",
            ids.iter().map(|id| contact(id, "Affiliate", "North")).collect(),
        )
        .await;

        fetch_in_chunks(&crm, "contacts", &ids, &[], 500).await?;

        assert_eq!(crm.batch_sizes().await, vec![100, 50]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_in_chunks_empty_ids_makes_no_calls() -> Result<()> {
        let crm = FakeCrm::new();
        let records = fetch_in_chunks(&crm, "contacts", &[], &[], 100).await?;
        assert!(records.is_empty());
        assert!(crm.batch_sizes().await.is_empty());
        Ok(())
    }
}
