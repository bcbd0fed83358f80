//! Shared test utilities.
//!
//! `FakeCrm` is an in-memory `CrmGateway` with call counters, failure
//! injection and page delays. The builders create CRM records with the
//! property names the default `MetricsConfig` expects.

use crate::{
    entities::{Entity, FilterGroup, FilterOperator, SearchPage, SearchQuery},
    errors::{Error, Result},
    gateway::CrmGateway,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber for the current thread only.
///
/// The process-wide dispatcher is left to `#[traced_test]`. Keep the guard
/// alive for as long as the test should log.
#[must_use]
pub(crate) fn init_test_tracing() -> DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Gateway operation a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FakeOp {
    Search,
    Count,
    Batch,
    GetById,
}

/// Kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureMode {
    Transport,
    Authorization,
}

impl FailureMode {
    fn to_error(self, what: &str) -> Error {
        match self {
            Self::Transport => Error::Transport {
                message: format!("connection reset while {what}"),
            },
            Self::Authorization => Error::Authorization {
                message: format!("missing scope for {what}"),
            },
        }
    }
}

#[derive(Default)]
struct FakeState {
    records: HashMap<String, Vec<Entity>>,
    totals: HashMap<String, u64>,
    associations: HashMap<(String, String, String), Vec<String>>,
    failures: HashMap<(FakeOp, String), FailureMode>,
    failing_associations: HashSet<String>,
    page_delays: HashMap<usize, Duration>,
    batch_sizes: Vec<usize>,
}

impl FakeState {
    fn check(&self, op: FakeOp, object_type: &str) -> Result<()> {
        match self.failures.get(&(op, object_type.to_string())) {
            Some(mode) => Err(mode.to_error(&format!("{op:?} on {object_type}"))),
            None => Ok(()),
        }
    }

    fn matching(&self, object_type: &str, groups: &[FilterGroup]) -> Vec<Entity> {
        self.records
            .get(object_type)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches_groups(record, groups))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn matches_groups(entity: &Entity, groups: &[FilterGroup]) -> bool {
    groups.is_empty()
        || groups.iter().any(|group| {
            group.filters.iter().all(|filter| match filter.operator {
                FilterOperator::HasProperty => entity.get(&filter.property_name).is_some(),
            })
        })
}

/// In-memory CRM.
#[derive(Default)]
pub(crate) struct FakeCrm {
    state: Mutex<FakeState>,
    search_calls: AtomicU64,
    count_calls: AtomicU64,
}

impl FakeCrm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends records to an object type.
    pub(crate) async fn add_records(&self, object_type: &str, records: Vec<Entity>) {
        self.state
            .lock()
            .await
            .records
            .entry(object_type.to_string())
            .or_default()
            .extend(records);
    }

    /// Makes `count` report `total` instead of the number of stored records.
    pub(crate) async fn set_total(&self, object_type: &str, total: u64) {
        self.state
            .lock()
            .await
            .totals
            .insert(object_type.to_string(), total);
    }

    pub(crate) async fn associate(&self, from_type: &str, id: &str, to_type: &str, ids: &[&str]) {
        self.state
            .lock()
            .await
            .associations
            .entry((from_type.to_string(), id.to_string(), to_type.to_string()))
            .or_default()
            .extend(ids.iter().map(|id| (*id).to_string()));
    }

    pub(crate) async fn fail(&self, op: FakeOp, object_type: &str, mode: FailureMode) {
        self.state
            .lock()
            .await
            .failures
            .insert((op, object_type.to_string()), mode);
    }

    /// Makes association listing fail for one record id.
    pub(crate) async fn fail_association(&self, id: &str) {
        self.state
            .lock()
            .await
            .failing_associations
            .insert(id.to_string());
    }

    /// Delays every search for the page at `page_index` (zero-based).
    pub(crate) async fn delay_page(&self, page_index: usize, delay: Duration) {
        self.state
            .lock()
            .await
            .page_delays
            .insert(page_index, delay);
    }

    pub(crate) fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn count_calls(&self) -> u64 {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Sizes of every batch read so far, in call order.
    pub(crate) async fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().await.batch_sizes.clone()
    }
}

#[async_trait]
impl CrmGateway for FakeCrm {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let offset: usize = query
            .after
            .as_deref()
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or(0);
        let limit = query.limit.max(1);

        let (page, delay) = {
            let state = self.state.lock().await;
            state.check(FakeOp::Search, &query.object_type)?;
            let matching = state.matching(&query.object_type, &query.filter_groups);
            let total = matching.len();
            let results: Vec<Entity> = matching.into_iter().skip(offset).take(limit).collect();
            let next = offset + results.len();
            let page = SearchPage {
                results,
                total: total as u64,
                next_cursor: (next < total).then(|| next.to_string()),
            };
            (page, state.page_delays.get(&(offset / limit)).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(page)
    }

    async fn count(&self, object_type: &str, filters: &[FilterGroup]) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        state.check(FakeOp::Count, object_type)?;
        Ok(state
            .totals
            .get(object_type)
            .copied()
            .unwrap_or_else(|| state.matching(object_type, filters).len() as u64))
    }

    async fn batch_get_by_ids(
        &self,
        object_type: &str,
        ids: &[String],
        _properties: &[String],
    ) -> Result<Vec<Entity>> {
        let mut state = self.state.lock().await;
        state.check(FakeOp::Batch, object_type)?;
        state.batch_sizes.push(ids.len());
        let records = state.records.get(object_type);
        Ok(ids
            .iter()
            .filter_map(|id| records.and_then(|all| all.iter().find(|r| &r.id == id)))
            .cloned()
            .collect())
    }

    async fn get_by_id(
        &self,
        object_type: &str,
        id: &str,
        _properties: &[String],
    ) -> Result<Option<Entity>> {
        let state = self.state.lock().await;
        state.check(FakeOp::GetById, object_type)?;
        Ok(state
            .records
            .get(object_type)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn associated_ids(&self, from_type: &str, id: &str, to_type: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        if state.failing_associations.contains(id) {
            return Err(FailureMode::Transport.to_error(&format!("listing associations of {id}")));
        }
        Ok(state
            .associations
            .get(&(from_type.to_string(), id.to_string(), to_type.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A contact with a membership category and a region.
pub(crate) fn contact(id: &str, category: &str, region: &str) -> Entity {
    Entity::new(id)
        .with_property("membership_type", category)
        .with_property("state", region)
}

/// A donation with an amount and a `YYYY-MM-DD` date.
pub(crate) fn donation(id: &str, amount: f64, date: &str) -> Entity {
    Entity::new(id)
        .with_property("amount", amount)
        .with_property("donation_date", date)
}

pub(crate) fn campaign(id: &str, name: &str, status: &str) -> Entity {
    Entity::new(id)
        .with_property("name", name)
        .with_property("status", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_local_tracing_leaves_global_dispatcher_alone() {
        {
            let _guard = init_test_tracing();
            tracing::warn!("routed to the thread-local subscriber");
        }
        tracing::warn!("routed to the captured subscriber");

        assert!(logs_contain("routed to the captured subscriber"));
        assert!(!logs_contain("routed to the thread-local subscriber"));
    }
}
