use exstream::{
    from_generator, from_iter, from_stream, Emitter, Event, Failure, Next, StreamError,
};
use futures_util::stream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn ticking(values: Vec<i32>, every_ms: u64) -> exstream::ExStream<i32> {
    from_stream(stream::unfold(values.into_iter(), move |mut it| async move {
        match it.next() {
            Some(next) => {
                sleep(Duration::from_millis(every_ms)).await;
                Some((next, it))
            }
            None => None,
        }
    }))
}

#[test]
fn test_merge_of_sync_streams_interleaves() {
    let result = from_iter(vec![from_iter(vec![1, 2, 3]), from_iter(vec![10, 20])])
        .merge()
        .values()
        .unwrap();
    assert_eq!(result, vec![1, 10, 2, 20, 3]);
}

#[tokio::test]
async fn test_merge_takes_first_available() {
    let slow = ticking(vec![100, 200], 40);
    let fast = ticking(vec![1, 2, 3], 5);
    let result = from_iter(vec![slow, fast]).merge().to_array().await;

    assert_eq!(result.len(), 5);
    // The fast stream finishes before the slow one produces its first value.
    assert_eq!(&result[..3], &[1, 2, 3]);
    let mut sorted = result.clone();
    sorted.sort();
    assert_eq!(sorted, vec![1, 2, 3, 100, 200]);
}

#[tokio::test]
async fn test_merge_failure_does_not_end_siblings() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();

    let mut step = 0;
    let broken = from_generator(move |emit: &mut Emitter<'_, i32>| {
        step += 1;
        match step {
            1 => emit.value(1),
            2 => emit.failure(Failure::msg("sub-stream failed")),
            3 => emit.value(2),
            _ => return Next::Done,
        }
        Next::Continue
    });
    let healthy = from_iter(vec![10, 20, 30]);

    let mut result = from_iter(vec![broken, healthy])
        .merge()
        .on_error(move |f: &Failure| sink.lock().unwrap().push(f.message()))
        .to_array()
        .await;
    result.sort();

    assert_eq!(result, vec![1, 2, 10, 20, 30]);
    assert_eq!(*failures.lock().unwrap(), vec!["sub-stream failed".to_string()]);
}

#[tokio::test]
async fn test_merge_with() {
    let mut result = from_iter(vec![1, 3]).merge_with(from_iter(vec![2, 4])).to_array().await;
    result.sort();
    assert_eq!(result, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_merge_with_keeps_error_observers() {
    let failures = Arc::new(Mutex::new(0));
    let sink = failures.clone();
    let left = from_iter(vec![1])
        .on_error(move |_| *sink.lock().unwrap() += 1)
        .try_map(|_: &i32| Err::<i32, _>("left failed"));

    let result = left.merge_with(from_iter(vec![2])).to_array().await;
    assert_eq!(result, vec![2]);
    assert_eq!(*failures.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_merge_with_keeps_observers_of_both_sides() {
    let left_calls = Arc::new(Mutex::new(0));
    let right_calls = Arc::new(Mutex::new(0));
    let left_sink = left_calls.clone();
    let right_sink = right_calls.clone();

    let left = from_iter(vec![1]).on_error(move |_| *left_sink.lock().unwrap() += 1);
    let right = from_iter(vec![2])
        .on_error(move |_| *right_sink.lock().unwrap() += 1)
        .try_map(|_: &i32| Err::<i32, _>("right failed"));

    let merged = left.merge_with(right);
    let handle = merged.error_handle();
    let result = merged.to_array().await;

    assert_eq!(result, vec![1]);
    assert_eq!(*right_calls.lock().unwrap(), 1);
    // Every observer of the merged pipeline sees the failure once.
    assert_eq!(*left_calls.lock().unwrap(), 1);
    assert!(handle.unhandled().is_empty());
}

#[tokio::test]
async fn test_merge_delivers_sub_stream_failures_to_its_observers() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let noisy = from_iter(vec![1, 2])
        .on_error(move |f: &Failure| sink.lock().unwrap().push(f.message()))
        .try_map(|x: &i32| if *x == 2 { Err("sub failed") } else { Ok(*x) });

    let merged = from_iter(vec![noisy, from_iter(vec![10])]).merge();
    let handle = merged.error_handle();
    let mut result = merged.to_array().await;
    result.sort();

    assert_eq!(result, vec![1, 10]);
    assert_eq!(*calls.lock().unwrap(), vec!["sub failed".to_string()]);
    assert!(handle.unhandled().is_empty());
}

#[test]
fn test_forced_merge_hands_failures_to_sub_stream_observers() {
    let calls = Arc::new(Mutex::new(0));
    let sink = calls.clone();
    let noisy = from_iter(vec![1, 2])
        .on_error(move |_| *sink.lock().unwrap() += 1)
        .try_map(|x: &i32| if *x == 1 { Err("one") } else { Ok(*x) });

    let result = from_iter(vec![noisy]).merge().values().unwrap();
    assert_eq!(result, vec![2]);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn test_merge_with_async_side_is_tainted() {
    let merged = from_iter(vec![1]).merge_with(ticking(vec![2], 1));
    assert!(merged.requires_async());
    assert!(matches!(merged.values(), Err(StreamError::RequiresAsync)));
}

#[tokio::test]
async fn test_merge_of_empty_outer_ends() {
    let mut s = from_iter(Vec::<exstream::ExStream<i32>>::new()).merge();
    assert_eq!(s.pull().await, Event::End);
}
