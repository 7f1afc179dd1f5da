use exstream::{from_iter, from_stream, Event, RateLimitConfig, StreamError};
use futures_util::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

// Timing assertions are lower bounds with a little slack: the combinators
// are best effort against tokio's millisecond timer resolution.

#[tokio::test]
async fn test_throttle_drops_values_pulled_inside_interval() {
    // Each drop waits out the rest of the interval before pulling again.
    let result = from_iter(0..5).throttle(Duration::from_millis(50)).to_array().await;
    assert_eq!(result, vec![0, 2, 4]);
}

#[tokio::test]
async fn test_throttle_over_endless_sync_source_yields_to_other_tasks() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let counter = pulls.clone();
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker_count = ticks.clone();
    let ticker = tokio::spawn(async move {
        loop {
            sleep(Duration::from_millis(1)).await;
            ticker_count.fetch_add(1, Ordering::SeqCst);
        }
    });

    let result = from_iter(0u64..)
        .map(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        })
        .throttle(Duration::from_millis(30))
        .take(3)
        .to_array()
        .await;
    ticker.abort();

    assert_eq!(result, vec![0, 2, 4]);
    assert!(pulls.load(Ordering::SeqCst) <= 6);
    assert!(ticks.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_throttle_keeps_values_when_consumer_is_slow() {
    let mut s = from_iter(0..3).throttle(Duration::from_millis(20));
    assert_eq!(s.pull().await, Event::Value(0));
    sleep(Duration::from_millis(30)).await;
    assert_eq!(s.pull().await, Event::Value(1));
    sleep(Duration::from_millis(30)).await;
    assert_eq!(s.pull().await, Event::Value(2));
    assert_eq!(s.pull().await, Event::End);
}

#[tokio::test]
async fn test_throttle_spaces_out_async_source() {
    let source = stream::unfold(0, |i| async move {
        if i == 20 {
            return None;
        }
        sleep(Duration::from_millis(5)).await;
        Some((i, i + 1))
    });

    let mut s = from_stream(source).throttle(Duration::from_millis(30));
    let mut arrivals = Vec::new();
    loop {
        match s.pull().await {
            Event::Value(v) => arrivals.push((v, Instant::now())),
            Event::Failure(_) => {}
            Event::End => break,
        }
    }

    assert!(!arrivals.is_empty());
    assert!(arrivals.len() < 20);
    assert_eq!(arrivals[0].0, 0);
    for pair in arrivals.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(25));
    }
}

#[tokio::test]
async fn test_throttle_is_async() {
    let s = from_iter(vec![1]).throttle(Duration::from_millis(10));
    assert!(s.requires_async());
    assert!(matches!(s.values(), Err(StreamError::RequiresAsync)));
}

#[test]
#[should_panic(expected = "throttle: interval must be greater than zero")]
fn test_throttle_zero_interval_panics() {
    let _ = from_iter(vec![1]).throttle(Duration::ZERO);
}

#[tokio::test]
async fn test_ratelimit_defers_without_dropping() {
    let start = Instant::now();
    let result = from_iter(0..6)
        .ratelimit(2, Duration::from_millis(50))
        .to_array()
        .await;
    assert_eq!(result, vec![0, 1, 2, 3, 4, 5]);
    // Three windows: the last pair cannot start before two full windows passed.
    assert!(start.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn test_ratelimit_first_window_is_immediate() {
    let start = Instant::now();
    let result = from_iter(0..3)
        .ratelimit(3, Duration::from_millis(200))
        .to_array()
        .await;
    assert_eq!(result, vec![0, 1, 2]);
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_ratelimit_with_slow_consumer_keeps_everything() {
    let mut s = from_iter(0..4).ratelimit(1, Duration::from_millis(10));
    let mut seen = Vec::new();
    while let Event::Value(v) = s.pull().await {
        seen.push(v);
        sleep(Duration::from_millis(15)).await;
    }
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_ratelimit_passes_failures_uncounted() {
    let mut s = from_iter(vec![1, 2, 3])
        .try_map(|x: &i32| if *x == 2 { Err("two") } else { Ok(*x) })
        .ratelimit_with(RateLimitConfig {
            count: 2,
            per: Duration::from_millis(100),
        });
    let start = Instant::now();
    assert_eq!(s.pull().await, Event::Value(1));
    assert!(s.pull().await.is_failure());
    assert_eq!(s.pull().await, Event::Value(3));
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(s.pull().await, Event::End);
}

#[test]
#[should_panic(expected = "ratelimit: count must be greater than zero")]
fn test_ratelimit_zero_count_panics() {
    let _ = from_iter(vec![1]).ratelimit(0, Duration::from_millis(10));
}
