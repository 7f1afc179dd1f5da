use exstream::{from_iter, Event, Failure, StreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_map_filter_reject() {
    let result = from_iter(1..=10)
        .map(|x| x * 3)
        .filter(|x| x % 2 == 0)
        .reject(|x| *x > 20)
        .values()
        .unwrap();
    assert_eq!(result, vec![6, 12, 18]);
}

#[test]
fn test_try_reject_failure_carries_input() {
    let err = from_iter(vec![1, 2])
        .try_reject(|x: &i32| if *x == 2 { Err("bad") } else { Ok(false) })
        .values()
        .unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.original_input::<i32>(), Some(&2));
}

#[test]
fn test_batch_emits_short_final_group() {
    let result = from_iter(1..=7).batch(3).values().unwrap();
    assert_eq!(result, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
}

#[test]
fn test_batch_exact_multiple_has_no_empty_group() {
    let result = from_iter(1..=4).batch(2).values().unwrap();
    assert_eq!(result, vec![vec![1, 2], vec![3, 4]]);
}

#[test]
#[should_panic(expected = "batch: size must be greater than zero")]
fn test_batch_zero_is_rejected_immediately() {
    let _ = from_iter(vec![1]).batch(0);
}

#[tokio::test]
async fn test_batch_forwards_failures_ahead_of_group() {
    let mut s = from_iter(vec![1, 2, 3])
        .try_map(|x: &i32| if *x == 2 { Err("two") } else { Ok(*x) })
        .batch(2);
    assert!(s.pull().await.is_failure());
    assert_eq!(s.pull().await, Event::Value(vec![1, 3]));
    assert_eq!(s.pull().await, Event::End);
}

#[test]
fn test_flatten_one_level() {
    let result = from_iter(vec![vec![1, 2], vec![], vec![3]])
        .flatten()
        .values()
        .unwrap();
    assert_eq!(result, vec![1, 2, 3]);
}

#[test]
fn test_uniq() {
    let result = from_iter(vec![1, 2, 1, 3, 2, 4]).uniq().values().unwrap();
    assert_eq!(result, vec![1, 2, 3, 4]);
}

#[test]
fn test_uniq_by_key() {
    let result = from_iter(vec!["apple", "avocado", "banana", "blueberry", "cherry"])
        .uniq_by(|s: &&str| Ok::<_, Failure>(s.chars().next()))
        .values()
        .unwrap();
    assert_eq!(result, vec!["apple", "banana", "cherry"]);
}

#[test]
fn test_split_across_chunk_boundaries() {
    let result = from_iter(vec!["alpha\nbe", "ta\r\ngam", "ma\n", "delta"])
        .split()
        .values()
        .unwrap();
    assert_eq!(result, vec!["alpha", "beta", "gamma", "delta"]);
}

#[test]
fn test_split_without_trailing_residue() {
    let result = from_iter(vec!["a\nb\n"]).split().values().unwrap();
    assert_eq!(result, vec!["a", "b"]);
}

#[test]
fn test_split_by_multi_char_delimiter() {
    let result = from_iter(vec!["a::b:", ":c::", "d"])
        .split_by("::")
        .values()
        .unwrap();
    assert_eq!(result, vec!["a", "b", "c", "d"]);
}

#[test]
#[should_panic(expected = "split_by: delimiter must not be empty")]
fn test_split_by_empty_delimiter_panics() {
    let _ = from_iter(vec!["abc"]).split_by("");
}

#[test]
fn test_slice_pulls_and_discards_skipped_items() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let result = from_iter(0..100)
        .map(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        })
        .slice(2, 5)
        .values()
        .unwrap();
    assert_eq!(result, vec![2, 3, 4]);
    // Nothing past the end of the range is pulled.
    assert_eq!(pulled.load(Ordering::SeqCst), 5);
}

#[test]
fn test_slice_forwards_failures_ahead_of_start_without_counting_them() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let result = from_iter(vec![0, 1, 2, 3, 4])
        .try_map(|x: &i32| if *x == 0 { Err("zero") } else { Ok(*x) })
        .slice(1, 3)
        .on_error(move |_: &Failure| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .values()
        .unwrap();
    assert_eq!(result, vec![2, 3]);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[test]
fn test_take_and_skip() {
    assert_eq!(from_iter(1..=5).take(2).values().unwrap(), vec![1, 2]);
    assert_eq!(from_iter(1..=5).skip(3).values().unwrap(), vec![4, 5]);
    assert_eq!(from_iter(1..=5).take(0).values().unwrap(), Vec::<i32>::new());
}

#[test]
#[should_panic(expected = "slice: start must not exceed end")]
fn test_slice_inverted_range_panics() {
    let _ = from_iter(vec![1]).slice(3, 1);
}

#[test]
fn test_reduce() {
    let total = from_iter(1..=4).reduce(0, |acc, x| acc + x).value().unwrap();
    assert_eq!(total, 10);
    let empty = from_iter(Vec::<i32>::new()).reduce(5, |acc, x| acc + x).value().unwrap();
    assert_eq!(empty, 5);
}

#[test]
fn test_reduce1() {
    let max = from_iter(vec![3, 9, 4]).reduce1(|a, b| a.max(b)).value().unwrap();
    assert_eq!(max, 9);
    let none = from_iter(Vec::<i32>::new()).reduce1(|a, b| a + b).values().unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_try_reduce_aborts_on_failure() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let mut s = from_iter(1..=5)
        .map(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        })
        .try_reduce(0, |acc, x| if x == 3 { Err("fold broke") } else { Ok(acc + x) });

    let failure = s.pull().await.failure().unwrap();
    assert_eq!(failure.message(), "fold broke");
    assert_eq!(s.pull().await, Event::End);
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
}

#[test]
fn test_value_requires_exactly_one_item() {
    let err = from_iter(vec![1, 2]).value().unwrap_err();
    assert!(matches!(err, StreamError::NotSingleValue { count: 2 }));
    let err = from_iter(Vec::<i32>::new()).value().unwrap_err();
    assert!(matches!(err, StreamError::NotSingleValue { count: 0 }));
}

#[test]
fn test_long_synchronous_pipeline_does_not_grow_the_stack() {
    let total = from_iter(0..200_000u64)
        .filter(|x| x % 2 == 0)
        .reduce(0u64, |acc, x| acc + x)
        .value()
        .unwrap();
    assert_eq!(total, (0..200_000u64).filter(|x| x % 2 == 0).sum::<u64>());
}
