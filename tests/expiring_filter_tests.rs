use std::thread;
use std::time::{Duration, Instant};

use cachebloom_rs::{ExpiringBloomFilter, FilterConfigBuilder};

fn create_filter(n: usize) -> ExpiringBloomFilter<String> {
    let config = FilterConfigBuilder::default()
        .expected_elements(n)
        .false_positive_probability(0.01)
        .build()
        .expect("Failed to build test config");
    ExpiringBloomFilter::new(config).expect("Failed to create test filter")
}

// Polls until `predicate` holds or the deadline passes; the expiry worker
// wakes up on its own schedule, so assertions on its effects need slack.
fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

#[test]
fn test_write_to_cached_element_is_visible_until_ttl_passes() {
    let filter = create_filter(100);
    let item = "report".to_string();

    filter.report_read(item.clone(), Duration::from_millis(100)).unwrap();
    assert!(filter.report_write(&item).unwrap());
    assert!(filter.contains(&item).unwrap());

    assert!(
        wait_until(Duration::from_millis(500), || {
            !filter.contains(&item).unwrap()
        }),
        "write should be un-recorded once the read TTL has passed"
    );
}

#[test]
fn test_write_without_cached_read_is_ignored() {
    let filter = create_filter(100);
    let item = "never read".to_string();

    assert!(!filter.report_write(&item).unwrap());
    assert!(!filter.contains(&item).unwrap());
}

#[test]
fn test_expired_read_no_longer_counts_as_cached() {
    let filter = create_filter(100);
    let item = "short".to_string();

    filter.report_read(item.clone(), Duration::from_millis(30)).unwrap();
    assert!(filter.is_cached(&item).unwrap());

    thread::sleep(Duration::from_millis(60));
    assert!(!filter.is_cached(&item).unwrap());
    assert!(!filter.report_write(&item).unwrap());
}

#[test]
fn test_ttl_extension_is_monotonic() {
    let filter = create_filter(100);
    let item = "extended".to_string();

    filter.report_read(item.clone(), Duration::from_millis(200)).unwrap();
    // A shorter second read must not shorten the window
    filter.report_read(item.clone(), Duration::from_millis(10)).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(filter.is_cached(&item).unwrap());
}

#[test]
fn test_each_write_triggers_exactly_one_decrement() {
    let filter = create_filter(100);
    let item = "written twice".to_string();

    filter.report_read(item.clone(), Duration::from_millis(80)).unwrap();
    assert!(filter.report_write(&item).unwrap());
    assert!(filter.report_write(&item).unwrap());
    assert_eq!(filter.pending_expirations().unwrap(), 2);

    assert!(
        wait_until(Duration::from_millis(500), || {
            filter.pending_expirations().unwrap() == 0
                && !filter.contains(&item).unwrap()
        }),
        "both scheduled decrements should have been applied"
    );
}

#[test]
fn test_later_read_does_not_extend_recorded_writes() {
    let filter = create_filter(100);
    let item = "rewritten".to_string();

    filter.report_read(item.clone(), Duration::from_millis(80)).unwrap();
    assert!(filter.report_write(&item).unwrap());
    // Extending the cache TTL afterwards must not delay the decrement
    // already queued for the write-time horizon.
    filter.report_read(item.clone(), Duration::from_secs(60)).unwrap();

    assert!(
        wait_until(Duration::from_millis(500), || {
            !filter.contains(&item).unwrap()
        }),
        "queued decrement should fire at its original expiry"
    );
    assert!(filter.is_cached(&item).unwrap());
}

#[test]
fn test_writes_to_distinct_elements_are_independent() {
    let filter = create_filter(1_000);

    for i in 0..20 {
        let item = format!("entry{i}");
        filter.report_read(item.clone(), Duration::from_secs(60)).unwrap();
        assert!(filter.report_write(&item).unwrap());
    }
    for i in 0..20 {
        assert!(filter.contains(&format!("entry{i}")).unwrap());
    }
    assert!(!filter.contains(&"entry99".to_string()).unwrap());
}

#[test]
fn test_drop_stops_the_worker() {
    let filter = create_filter(100);
    let item = "pending".to_string();
    filter.report_read(item.clone(), Duration::from_secs(60)).unwrap();
    filter.report_write(&item).unwrap();
    // Dropping with a pending expiration must not hang
    drop(filter);
}
