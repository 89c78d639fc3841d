//! Behavior tests for date range planning and geometry partitioning as
//! exercised through the pull pipeline.

use std::sync::atomic::Ordering;

use canopy_core::{
    AlertsFetcher, CoreError, NoopRecorder, PartitionScheme, PerfRecorder, PullRequest,
    ValidationError,
};
use canopy_tests::*;

fn fetcher(source: Arc<MockAlertsSource>, config: FetchConfig) -> AlertsFetcher {
    AlertsFetcher::new(source, config, Arc::new(NoopRecorder) as Arc<dyn PerfRecorder>)
}

fn request(aoi: AoiGeometry, start: &str, end: &str) -> PullRequest {
    PullRequest {
        dataset: DatasetId::GfwIntegratedAlerts,
        geometry: aoi,
        range: range(start, end),
    }
}

// =============================================================================
// Date range planning
// =============================================================================

#[tokio::test]
async fn ten_day_window_with_seven_day_cap_becomes_two_queries() {
    let source = Arc::new(MockAlertsSource::new());
    let fetcher = fetcher(source.clone(), FetchConfig::default());

    let result = fetcher
        .pull(request(square_aoi(0.5), "2024-01-01", "2024-01-11"))
        .await
        .expect("pull succeeds");

    assert!(result.is_complete());
    assert_eq!(source.query_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn weekly_cadence_widens_chunks_up_to_the_cap() {
    // Given: a weekly dataset and a generous per-query cap
    let source = Arc::new(MockAlertsSource::new().with_cadence(UpdateCadence::Weekly));
    let mut config = FetchConfig::default();
    config.max_days_per_query = 30;
    let fetcher = fetcher(source, config);

    // When: planning a 28-day window
    let summary = fetcher
        .plan(&request(square_aoi(0.5), "2024-01-01", "2024-01-29"))
        .await
        .expect("plan succeeds");

    // Then: the planner prefers 14-day chunks over 30-day ones
    assert_eq!(summary.chunks.len(), 2);
    assert!(summary.chunks.iter().all(|chunk| chunk.days() == 14));
}

#[tokio::test]
async fn chunks_tile_the_requested_range_exactly() {
    let source = Arc::new(MockAlertsSource::new());
    let fetcher = fetcher(source, FetchConfig::default());
    let requested = range("2024-01-01", "2024-02-15");

    let summary = fetcher
        .plan(&PullRequest {
            dataset: DatasetId::GfwIntegratedAlerts,
            geometry: square_aoi(0.5),
            range: requested,
        })
        .await
        .expect("plan succeeds");

    assert_eq!(summary.chunks.first().expect("chunks").start, requested.start);
    assert_eq!(summary.chunks.last().expect("chunks").end, requested.end);
    for pair in summary.chunks.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

#[tokio::test]
async fn unavailable_metadata_degrades_to_fixed_chunking_with_a_warning() {
    let source = Arc::new(MockAlertsSource::new().with_failing_metadata());
    let fetcher = fetcher(source.clone(), FetchConfig::default());

    let result = fetcher
        .pull(request(square_aoi(0.5), "2024-01-01", "2024-01-11"))
        .await
        .expect("pull still succeeds");

    assert!(result.is_complete());
    assert_eq!(result.warnings().len(), 1);
    assert_eq!(source.query_calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Geometry partitioning
// =============================================================================

#[tokio::test]
async fn large_aois_split_but_never_exceed_the_partition_cap() {
    let source = Arc::new(MockAlertsSource::new());
    let fetcher = fetcher(source.clone(), FetchConfig::default());

    let summary = fetcher
        .plan(&request(square_aoi(6.0), "2024-01-01", "2024-01-08"))
        .await
        .expect("plan succeeds");

    assert!(summary.partition_count > 1);
    assert!(summary.partition_count <= 10);
    assert_eq!(summary.work_items, summary.partition_count * summary.chunks.len());
}

#[tokio::test]
async fn legacy_fixed_interval_grid_is_still_selectable() {
    let source = Arc::new(MockAlertsSource::new());
    let mut config = FetchConfig::default();
    config.partition_scheme = PartitionScheme::FixedInterval {
        interval_deg: 1.0,
        buffer_deg: 0.0,
    };
    let fetcher = fetcher(source, config);

    let summary = fetcher
        .plan(&request(square_aoi(2.0), "2024-01-01", "2024-01-08"))
        .await
        .expect("plan succeeds");

    assert_eq!(summary.partition_count, 4);
}

#[tokio::test]
async fn every_registered_partition_is_queried_for_every_chunk() {
    let source = Arc::new(MockAlertsSource::new());
    let fetcher = fetcher(source.clone(), FetchConfig::default());

    let result = fetcher
        .pull(request(square_aoi(4.0), "2024-01-01", "2024-01-15"))
        .await
        .expect("pull succeeds");

    let partitions = source.registration_calls.load(Ordering::SeqCst);
    let queries = source.query_calls.load(Ordering::SeqCst);
    assert!(partitions > 1);
    assert_eq!(queries, partitions * 2, "two chunks per partition");
    assert!(result.is_complete());
    assert_eq!(result.records().len(), partitions);
}

#[tokio::test]
async fn degenerate_geometry_is_rejected_before_any_network_call() {
    let source = Arc::new(MockAlertsSource::new());
    let fetcher = fetcher(source.clone(), FetchConfig::default());

    let sliver = AoiGeometry::rect(BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 1.0,
    });
    let error = fetcher
        .pull(request(sliver, "2024-01-01", "2024-01-08"))
        .await
        .expect_err("degenerate AOI must fail");

    assert!(matches!(
        error,
        CoreError::Validation(ValidationError::DegenerateGeometry)
    ));
    assert_eq!(source.registration_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.query_calls.load(Ordering::SeqCst), 0);
}
