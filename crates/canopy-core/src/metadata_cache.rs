//! TTL cache for dataset descriptors with single-flight fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::domain::{DatasetDescriptor, DatasetId};
use crate::source::{AlertsSource, SourceError};

pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    descriptor: DatasetDescriptor,
    fetched_at: Instant,
}

struct Slot {
    cached: Option<CacheEntry>,
    /// Serializes upstream fetches for this dataset so concurrent misses
    /// trigger exactly one metadata call.
    fetch_lock: Arc<Mutex<()>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            cached: None,
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Caches dataset descriptors with time-bounded validity.
///
/// An expired entry is treated as absent and refetched, never served stale.
/// A failed upstream fetch is not stored, so the next `get` re-attempts.
pub struct MetadataCache {
    source: Arc<dyn AlertsSource>,
    ttl: Duration,
    slots: Mutex<HashMap<DatasetId, Slot>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn AlertsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(source: Arc<dyn AlertsSource>) -> Self {
        Self::new(source, DEFAULT_METADATA_TTL)
    }

    pub async fn get(&self, dataset: DatasetId) -> Result<DatasetDescriptor, SourceError> {
        let fetch_lock = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(dataset).or_default();
            if let Some(descriptor) = Self::valid_descriptor(slot, self.ttl) {
                return Ok(descriptor);
            }
            slot.fetch_lock.clone()
        };

        let _fetching = fetch_lock.lock().await;

        // A concurrent caller may have completed the fetch while we waited.
        {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(dataset).or_default();
            if let Some(descriptor) = Self::valid_descriptor(slot, self.ttl) {
                return Ok(descriptor);
            }
        }

        let descriptor = self.source.fetch_metadata(dataset).await?;

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(dataset).or_default();
        slot.cached = Some(CacheEntry {
            descriptor: descriptor.clone(),
            fetched_at: Instant::now(),
        });

        Ok(descriptor)
    }

    /// Drops any cached entry for the dataset.
    pub async fn invalidate(&self, dataset: DatasetId) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&dataset) {
            slot.cached = None;
        }
    }

    fn valid_descriptor(slot: &Slot, ttl: Duration) -> Option<DatasetDescriptor> {
        slot.cached.as_ref().and_then(|entry| {
            if entry.fetched_at.elapsed() < ttl {
                Some(entry.descriptor.clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::{
        AlertRecord, AoiGeometry, PartitionId, UpdateCadence,
    };
    use crate::source::{AlertsQuery, SourceFuture};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AlertsSource for CountingSource {
        fn fetch_metadata<'a>(&'a self, dataset: DatasetId) -> SourceFuture<'a, DatasetDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                // Yield so concurrent callers pile up on the fetch lock.
                tokio::task::yield_now().await;
                if fail {
                    Err(SourceError::upstream("metadata endpoint unavailable"))
                } else {
                    Ok(DatasetDescriptor::new(dataset, UpdateCadence::Daily))
                }
            })
        }

        fn register_partition<'a>(
            &'a self,
            _geometry: &'a AoiGeometry,
        ) -> SourceFuture<'a, PartitionId> {
            Box::pin(async { Ok(PartitionId::from_upstream("stub")) })
        }

        fn fetch_alerts<'a>(&'a self, _query: AlertsQuery) -> SourceFuture<'a, Vec<AlertRecord>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn hit_avoids_upstream_call() {
        let source = Arc::new(CountingSource::new(false));
        let cache = MetadataCache::new(source.clone(), Duration::from_secs(60));

        cache.get(DatasetId::GfwIntegratedAlerts).await.expect("first get");
        cache.get(DatasetId::GfwIntegratedAlerts).await.expect("second get");

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_deduplicate_to_one_fetch() {
        let source = Arc::new(CountingSource::new(false));
        let cache = Arc::new(MetadataCache::new(source.clone(), Duration::from_secs(60)));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(DatasetId::GfwIntegratedAlerts).await })
        };
        let second = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(DatasetId::GfwIntegratedAlerts).await })
        };

        first.await.expect("join").expect("first get");
        second.await.expect("join").expect("second get");

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let source = Arc::new(CountingSource::new(false));
        let cache = MetadataCache::new(source.clone(), Duration::from_millis(20));

        cache.get(DatasetId::NasaViirsFireAlerts).await.expect("first get");
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get(DatasetId::NasaViirsFireAlerts).await.expect("second get");

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let source = Arc::new(CountingSource::new(true));
        let cache = MetadataCache::new(source.clone(), Duration::from_secs(60));

        cache
            .get(DatasetId::GfwIntegratedAlerts)
            .await
            .expect_err("first get must fail");
        cache
            .get(DatasetId::GfwIntegratedAlerts)
            .await
            .expect_err("second get must fail");

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let source = Arc::new(CountingSource::new(false));
        let cache = MetadataCache::new(source.clone(), Duration::from_secs(60));

        cache.get(DatasetId::GfwIntegratedAlerts).await.expect("first get");
        cache.invalidate(DatasetId::GfwIntegratedAlerts).await;
        cache.get(DatasetId::GfwIntegratedAlerts).await.expect("second get");

        assert_eq!(source.calls(), 2);
    }
}
