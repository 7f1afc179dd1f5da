use exstream::pipe;
use exstream::pipe::*;
use exstream::{from_iter, from_stream, Failure};
use futures_util::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

#[test]
fn test_pipe_map() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let stream = from_iter(vec![1, 2, 3, 4, 5]);
        let pipe = map(|x: i32| x * 2);

        let result = pipe.generate_stream(stream).to_array().await;
        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    });
}

#[test]
fn test_pipe_filter() {
    let stream = from_iter(vec![1, 2, 3, 4, 5]);
    let pipe = pipe::filter(|x: &i32| x % 2 == 0);

    let result = pipe.generate_stream(stream).values().unwrap();
    assert_eq!(result, vec![2, 4]);
}

#[test]
fn test_pipe_compose() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let stream = from_iter(vec![1, 2, 3, 4, 5]);

        let double = pipe::map(|x: i32| x * 2);
        let over_four = pipe::filter(|x: &i32| *x > 4);
        let pipe = pipe::compose(double, over_four);

        let result = pipe.generate_stream(stream).to_array().await;
        assert_eq!(result, vec![6, 8, 10]);
    });
}

#[test]
fn test_pipe_identity() {
    let pipe = pipe::identity();
    let result = pipe.generate_stream(from_iter(vec![1, 2, 3])).values().unwrap();
    assert_eq!(result, vec![1, 2, 3]);
}

#[test]
fn test_builder_chain() {
    let template: Pipeline<i32, Vec<String>> = identity::<i32>()
        .filter(|x| *x > 0)
        .map(|x| x.to_string())
        .batch(2);

    let result = from_iter(vec![-1, 1, 2, 3]).through(&template).values().unwrap();
    assert_eq!(result, vec![vec!["1".to_string(), "2".to_string()], vec!["3".to_string()]]);
}

#[test]
fn test_each_instantiation_is_independent() {
    let template = identity::<i32>().uniq().take(2);

    let first = template.generate_stream(from_iter(vec![1, 1, 2, 3])).values().unwrap();
    let second = template.generate_stream(from_iter(vec![1, 2, 3])).values().unwrap();
    assert_eq!(first, vec![1, 2]);
    // Seen keys and the take counter are not shared with the first run.
    assert_eq!(second, vec![1, 2]);
}

#[test]
fn test_template_state_is_fresh_per_instantiation() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let template = Pipeline::new(move |s: exstream::ExStream<i32>| {
        counter.fetch_add(1, Ordering::SeqCst);
        s.map(|x| x + 1)
    });

    assert_eq!(built.load(Ordering::SeqCst), 0);
    let _a = template.generate_stream(from_iter(vec![1]));
    let _b = template.clone().generate_stream(from_iter(vec![2]));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_template_error_handling() {
    let template = identity::<i32>()
        .try_map(|x: &i32| if *x == 0 { Err("zero") } else { Ok(10 / *x) })
        .errors(|_, push| push.value(-1));

    let result = from_iter(vec![5, 0, 2]).through(&template).values().unwrap();
    assert_eq!(result, vec![2, -1, 5]);
}

#[tokio::test]
async fn test_template_observers_are_per_instance() {
    let template = identity::<i32>().try_map(|_: &i32| Err::<i32, _>("always"));
    let seen = Arc::new(Mutex::new(0));

    let sink = seen.clone();
    let first = template
        .generate_stream(from_iter(vec![1, 2]))
        .on_error(move |_: &Failure| *sink.lock().unwrap() += 1);
    let second = template.generate_stream(from_iter(vec![3]));
    let handle = second.error_handle();

    first.to_array().await;
    second.to_array().await;
    assert_eq!(*seen.lock().unwrap(), 2);
    assert_eq!(handle.unhandled().len(), 1);
}

#[tokio::test]
async fn test_template_with_async_stages() {
    let template = identity::<i32>()
        .throttle(Duration::from_millis(1))
        .slice(0, 3)
        .skip(1)
        .reject(|x| *x == 2);

    let s = from_stream(stream::iter(vec![1, 2, 3])).through(&template);
    assert!(s.requires_async());
    let result = s.to_array().await;
    assert!(result.iter().all(|x| *x != 2));
}

#[tokio::test]
async fn test_template_ratelimit_and_chain() {
    let template = identity::<i32>()
        .ratelimit(10, Duration::from_millis(10))
        .chain(|s| s.reduce(0, |a, b| a + b));
    let result = from_iter(1..=4).through(&template).to_array().await;
    assert_eq!(result, vec![10]);
}
