//! Redis stream tests
//!
//! Run only when `TRUEGUL_TEST_REDIS_URL` points at a disposable Redis.

mod common;

use common::{services, wait_for, MockDetector, MockFeedback, RecordingCallback};
use std::sync::Arc;
use std::time::Duration;
use truegul_core::{AnalysisTask, CallbackStatus, WritingKind};
use truegul_worker::mq::{
    Consumer, ConsumerOptions, ConsumerState, RedisBackend, StreamConsumer, TaskPublisher,
};
use truegul_worker::TaskProcessor;

fn redis_url() -> Option<String> {
    std::env::var("TRUEGUL_TEST_REDIS_URL").ok()
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

fn consumer(url: &str, stream: &str, group: &str, name: &str) -> StreamConsumer<RedisBackend> {
    StreamConsumer::new(
        RedisBackend::new(url),
        ConsumerOptions::new(stream, group, name).with_block_timeout(Duration::from_millis(200)),
    )
}

#[tokio::test]
async fn test_connect_tolerates_existing_group() {
    let Some(url) = redis_url() else {
        eprintln!("TRUEGUL_TEST_REDIS_URL not set, skipping");
        return;
    };
    let stream = unique("truegul-test");

    let first = consumer(&url, &stream, "ml_workers", "worker_1");
    first.connect().await.unwrap();

    let second = consumer(&url, &stream, "ml_workers", "worker_2");
    second.connect().await.unwrap();
    assert_eq!(second.state(), ConsumerState::Connected);

    first.disconnect().await.unwrap();
    second.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_published_task_is_processed_and_acked() {
    let Some(url) = redis_url() else {
        eprintln!("TRUEGUL_TEST_REDIS_URL not set, skipping");
        return;
    };
    let stream = unique("truegul-test");

    let redis_consumer: Arc<dyn Consumer> = Arc::new(consumer(&url, &stream, "ml_workers", "worker_1"));
    let callback = Arc::new(RecordingCallback::new());
    let processor = TaskProcessor::new(
        redis_consumer,
        services(Arc::new(MockDetector::new(12.5)), Arc::new(MockFeedback::new("Good clarity."))),
        callback.clone(),
    );
    processor.start().await.unwrap();

    let publisher = TaskPublisher::connect(&url, &stream).await.unwrap();
    let task = AnalysisTask::new("t1", "w1", "Hello world.", WritingKind::Essay, "http://x/cb");
    publisher.publish(&task).await.unwrap();

    let sent = callback.clone();
    assert!(wait_for(Duration::from_secs(10), || sent.sent().len() == 1).await);
    assert_eq!(callback.sent()[0].1.status, CallbackStatus::Completed);

    processor.shutdown().await;

    let client = redis::Client::open(url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
        .arg(&stream)
        .arg("ml_workers")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(pending.count(), 0);

    let _: () = redis::cmd("DEL").arg(&stream).query_async(&mut conn).await.unwrap();
}
