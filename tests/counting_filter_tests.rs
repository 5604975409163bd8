use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use cachebloom_rs::{
    CountingBloomFilter, CountingOps, FilterConfigBuilder, HashMethod,
};
use rand::Rng;

fn create_filter(n: usize, p: f64) -> CountingBloomFilter {
    let config = FilterConfigBuilder::default()
        .expected_elements(n)
        .false_positive_probability(p)
        .hash_method(HashMethod::Md5)
        .build()
        .expect("Failed to build test config");
    CountingBloomFilter::new(config).expect("Failed to create test filter")
}

#[test]
fn test_counting_basics() {
    let filter = create_filter(2, 0.01);

    filter.add_element("Käsebrot").unwrap();
    assert!(filter.contains_element("Käsebrot").unwrap());
    filter.remove_element("Käsebrot").unwrap();
    assert!(!filter.contains_element("Käsebrot").unwrap());

    filter.add_element("Schnitte").unwrap();
    filter.add_element("Schnitte").unwrap();
    assert!(filter.contains_element("Schnitte").unwrap());
    filter.remove_element("Schnitte").unwrap();
    assert!(filter.contains_element("Schnitte").unwrap());
    filter.remove_element("Schnitte").unwrap();
    assert!(!filter.contains_element("Schnitte").unwrap());
}

#[test]
fn test_add_and_remove_words() {
    let filter = create_filter(5, 0.01);
    let words = ["Käsebrot", "ist", "ein", "gutes", "Brot"];

    for word in words {
        filter.add_element(word).unwrap();
    }
    for word in words {
        assert!(filter.contains_element(word).unwrap());
    }
    assert!(!filter.contains_element("Kartoffelsalate").unwrap());

    for word in words {
        filter.remove_element(word).unwrap();
    }
    for word in words {
        assert!(!filter.contains_element(word).unwrap());
    }
    assert!(filter.is_empty().unwrap());
}

#[test]
fn test_count_estimates_are_exact_for_skewed_inserts() {
    // 100 draws from a 20-symbol alphabet: lots of repeats, so the
    // min-of-counters estimate is exercised well past 1.
    let filter = create_filter(1_000, 0.01);
    let mut rng = rand::thread_rng();
    let adds: Vec<String> = (0..100)
        .map(|_| (rng.gen::<i64>() % 20).to_string())
        .collect();

    let mut true_counts: HashMap<&str, i64> = HashMap::new();
    for item in &adds {
        let count = true_counts.entry(item.as_str()).or_insert(0);
        *count += 1;
        assert_eq!(
            filter.add_and_estimate_count(item.as_bytes()).unwrap(),
            *count,
            "estimate after adding {item}"
        );
    }

    for item in &adds {
        assert_eq!(
            filter.estimated_count(item.as_bytes()).unwrap(),
            true_counts[item.as_str()],
            "estimated count of {item}"
        );
    }

    for item in &adds {
        let count = true_counts.entry(item.as_str()).or_insert(0);
        *count -= 1;
        assert_eq!(
            filter.remove_and_estimate_count(item.as_bytes()).unwrap(),
            *count,
            "estimate after removing {item}"
        );
    }

    assert!(filter.is_empty().unwrap());
}

#[test]
fn test_count_never_below_true_multiplicity() {
    let filter = create_filter(100, 0.05);
    for round in 1..=5i64 {
        filter.add(b"counted").unwrap();
        assert!(filter.estimated_count(b"counted").unwrap() >= round);
    }
    for round in (0..5i64).rev() {
        filter.remove(b"counted").unwrap();
        assert!(filter.estimated_count(b"counted").unwrap() >= round);
    }
}

#[test]
fn test_concurrent_adds_are_all_visible() {
    let filter = Arc::new(create_filter(1_000, 0.01));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let filter = Arc::clone(&filter);
            thread::spawn(move || {
                for j in 0..20 {
                    filter
                        .add_element(&format!("concurrent_{i}_{j}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..10 {
        for j in 0..20 {
            assert!(filter
                .contains_element(&format!("concurrent_{i}_{j}"))
                .unwrap());
        }
    }
}

#[test]
fn test_clear_resets_counts() {
    let filter = create_filter(100, 0.01);
    filter.add(b"a").unwrap();
    filter.add(b"a").unwrap();
    filter.clear().unwrap();
    assert!(filter.is_empty().unwrap());
    assert_eq!(filter.estimated_count(b"a").unwrap(), 0);
}
