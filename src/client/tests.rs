use std::sync::Arc;
use std::time::{Duration, Instant};

use super::mock::MockStreamingRpc;
use super::output::OutputBuffer;
use super::request::BaseRequest;
use super::traits::{RequestOutput, StreamOutput};
use crate::config::ClientConfig;
use crate::Error;
use tokio_test::{assert_err, assert_ok};

type Mock = MockStreamingRpc<String, String>;

// Never dialed: the mock binding ignores the channel
const ADDRESS: &str = "127.0.0.1:1";

fn config() -> ClientConfig {
    ClientConfig::new(ADDRESS).with_poll_interval(Duration::from_millis(20))
}

fn items(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn wait_until_stopped(output: &dyn RequestOutput) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while output.running() {
        assert!(Instant::now() < deadline, "call did not stop in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[tokio::test]
async fn test_execute_streams_items_in_order() {
    let mock = Mock::new().with_items(items(&["a", "b"]));
    let probe = mock.probe();
    let engine = BaseRequest::new(mock.into_factory(), "req".to_string(), &config());
    let output = OutputBuffer::new();

    assert_ok!(engine.execute(&output).await);
    assert_eq!(output.get_data(), items(&["a", "b"]));
    assert!(probe.started());
    // Two items plus the end of stream
    assert_eq!(probe.reads(), 3);
    assert_eq!(probe.finishes(), 1);
}

#[tokio::test]
async fn test_execute_empty_stream() {
    let engine = BaseRequest::new(Mock::new().into_factory(), String::new(), &config());
    let output = OutputBuffer::new();

    assert_ok!(engine.execute(&output).await);
    assert!(!output.ready());
}

#[tokio::test]
async fn test_initiation_failure() {
    let mock = Mock::new()
        .with_items(items(&["never"]))
        .with_start_failure(tonic::Status::unavailable("connection refused"));
    let probe = mock.probe();
    let engine = BaseRequest::new(mock.into_factory(), String::new(), &config());
    let output = OutputBuffer::new();

    let err = assert_err!(engine.execute(&output).await);

    assert!(matches!(err, Error::InitializationFailed(_)));
    assert!(err.to_string().contains("initialize"));
    assert!(output.get_data().is_empty());
    assert_eq!(probe.reads(), 0);
}

#[tokio::test]
async fn test_terminate_before_first_read() {
    let mock = Mock::new().with_items(items(&["a", "b"]));
    let probe = mock.probe();
    let engine = BaseRequest::new(mock.into_factory(), String::new(), &config());
    let output = OutputBuffer::new();
    output.terminate();

    let err = assert_err!(engine.execute(&output).await);

    assert!(err.is_aborted());
    assert!(!output.ready());
    assert!(output.get_data().is_empty());
    assert!(!probe.started());
    assert_eq!(probe.reads(), 0);
    assert_eq!(probe.finishes(), 0);
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_received_items() {
    let mock = Mock::new()
        .with_items(items(&["a"]))
        .with_read_failure(tonic::Status::unavailable("connection reset"));
    let probe = mock.probe();
    let engine = BaseRequest::new(mock.into_factory(), String::new(), &config());
    let output = OutputBuffer::new();

    let err = assert_err!(engine.execute(&output).await);

    match err {
        Error::StreamInterrupted(status) => assert_eq!(status.code(), tonic::Code::Unavailable),
        other => panic!("Expected StreamInterrupted, got {:?}", other),
    }
    assert_eq!(output.get_data(), items(&["a"]));
    assert_eq!(probe.finishes(), 1);
}

#[tokio::test]
async fn test_non_ok_final_status() {
    let mock = Mock::new()
        .with_items(items(&["a"]))
        .with_finish(tonic::Status::permission_denied("namespace not allowed"));
    let engine = BaseRequest::new(mock.into_factory(), String::new(), &config());
    let output = OutputBuffer::new();

    let err = assert_err!(engine.execute(&output).await);

    assert_eq!(err.code(), Some(tonic::Code::PermissionDenied));
    assert!(!err.is_aborted());
    assert_eq!(output.get_data(), items(&["a"]));
}

#[tokio::test]
async fn test_request_is_submitted_once() {
    let mock = Mock::new();
    let requests = mock.requests();
    let engine = BaseRequest::new(mock.into_factory(), "filter==topic".to_string(), &config());

    assert_ok!(engine.execute(&OutputBuffer::new()).await);

    assert_eq!(*requests.lock().unwrap(), items(&["filter==topic"]));
}

#[test]
fn test_create_runs_call_in_background() {
    let mock = Mock::new().with_items(items(&["a", "b", "c"]));
    let output = BaseRequest::create(&config(), mock.into_factory(), String::new()).unwrap();

    assert!(matches!(output.wait(), Some(Ok(()))));
    assert!(!output.running());
    assert!(output.ready());
    assert_eq!(output.get_data(), items(&["a", "b", "c"]));
    assert!(output.get_data().is_empty());
}

#[test]
fn test_terminate_hanging_stream() {
    let mock = Mock::new().with_items(items(&["a"])).hanging();
    let output = BaseRequest::create(&config(), mock.into_factory(), String::new()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !output.ready() {
        assert!(Instant::now() < deadline, "first item never arrived");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(output.running());

    output.terminate();
    wait_until_stopped(&output);

    assert!(matches!(output.status(), Some(Err(Error::Aborted))));
    assert_eq!(output.get_data(), items(&["a"]));
}

#[test]
fn test_concurrent_calls_do_not_interleave() {
    let first = Mock::new()
        .with_items(items(&["a1", "a2", "a3"]))
        .with_read_delay(Duration::from_millis(5));
    let second = Mock::new()
        .with_items(items(&["b1", "b2"]))
        .with_read_delay(Duration::from_millis(3));

    let first = BaseRequest::create(&config(), first.into_factory(), String::new()).unwrap();
    let second = BaseRequest::create(&config(), second.into_factory(), String::new()).unwrap();

    assert!(matches!(first.wait(), Some(Ok(()))));
    assert!(matches!(second.wait(), Some(Ok(()))));
    assert_eq!(first.get_data(), items(&["a1", "a2", "a3"]));
    assert_eq!(second.get_data(), items(&["b1", "b2"]));
}

#[test]
fn test_drop_stops_and_joins_worker() {
    let mock = Mock::new().hanging();
    let probe = mock.probe();
    let output = BaseRequest::create(&config(), mock.into_factory(), String::new()).unwrap();
    let buffer = Arc::clone(output.buffer());

    let deadline = Instant::now() + Duration::from_secs(5);
    while probe.reads() == 0 {
        assert!(Instant::now() < deadline, "call never started reading");
        std::thread::sleep(Duration::from_millis(5));
    }

    drop(output);

    assert_eq!(Arc::strong_count(&buffer), 1);
    assert!(matches!(buffer.status(), Some(Err(Error::Aborted))));
}
