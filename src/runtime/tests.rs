use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::bus::Notifier;
use crate::config::FeedConfig;
use crate::core::change::{ChangeBatch, FileChange};
use crate::store::{ChangeStore, FileStateStore};
use crate::testing::{memory_store, wait_for_processed, FaultyStore};

use super::*;

fn processor_over(store: Arc<dyn ChangeStore>) -> (BatchProcessor, Arc<EventLog>, Arc<Notifier>) {
    let files = FileStateStore::new(store.clone());
    let log = Arc::new(EventLog::new(
        store.clone(),
        Arc::new(SequenceAssigner::new(store)),
    ));
    let notifier = Arc::new(Notifier::new());
    let processor = BatchProcessor::new(files, log.clone(), notifier.clone());
    (processor, log, notifier)
}

async fn seqs_and_paths(log: &EventLog, project_id: &str) -> Vec<(i64, String)> {
    log.entries_after(project_id, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| (entry.seq, entry.change.path))
        .collect()
}

// ====================================================================================
// BATCH PROCESSOR
// ====================================================================================

#[tokio::test]
async fn test_processor_skips_empty_path_silently() {
    let (processor, log, _) = processor_over(Arc::new(memory_store()));
    let batch = ChangeBatch::new(
        "p1",
        "u1",
        vec![FileChange::create(""), FileChange::create("a.txt")],
    );

    let report = processor.process_batch(&batch).await;

    assert_eq!(
        report,
        BatchReport {
            applied: 1,
            skipped: 1,
            ..BatchReport::default()
        }
    );
    assert_eq!(seqs_and_paths(&log, "p1").await, vec![(1, "a.txt".to_string())]);
}

#[tokio::test]
async fn test_processor_isolates_store_failure() {
    let store = Arc::new(FaultyStore::new());
    store.fail_path("b.txt");
    let (processor, log, _) = processor_over(store.clone());

    let batch = ChangeBatch::new(
        "p1",
        "u1",
        vec![
            FileChange::create("a.txt"),
            FileChange::create("b.txt"),
            FileChange::create("c.txt"),
        ],
    );
    let report = processor.process_batch(&batch).await;

    assert_eq!(report.applied, 2);
    assert_eq!(report.store_failures, 1);
    assert_eq!(
        seqs_and_paths(&log, "p1").await,
        vec![(1, "a.txt".to_string()), (2, "c.txt".to_string())]
    );
    assert!(store.get_file("p1", "b.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_processor_log_failure_leaves_state_diverged() {
    let store = Arc::new(FaultyStore::new());
    let (processor, log, notifier) = processor_over(store.clone());
    let mut sub = notifier.subscribe("p1");

    store.fail_appends(true);
    let report = processor
        .process_batch(&ChangeBatch::new("p1", "u1", vec![FileChange::create("a.txt")]))
        .await;
    assert_eq!(report.log_failures, 1);
    assert!(store.get_file("p1", "a.txt").await.unwrap().is_some());
    assert!(log.entries_after("p1", 0).await.unwrap().is_empty());
    assert!(sub.try_recv().is_none());

    store.fail_appends(false);
    processor
        .process_batch(&ChangeBatch::new("p1", "u1", vec![FileChange::create("b.txt")]))
        .await;
    assert_eq!(seqs_and_paths(&log, "p1").await, vec![(1, "b.txt".to_string())]);
}

#[tokio::test]
async fn test_processor_guard_catches_panic() {
    let store = Arc::new(FaultyStore::new());
    store.panic_on_path("boom.txt");
    let (processor, log, _) = processor_over(store.clone());

    let batch = ChangeBatch::new(
        "p1",
        "u1",
        vec![FileChange::create("a.txt"), FileChange::create("boom.txt")],
    );
    assert!(processor.process_guarded(&batch).await.is_none());

    let next = ChangeBatch::new("p1", "u1", vec![FileChange::create("c.txt")]);
    assert_eq!(processor.process_guarded(&next).await.map(|r| r.applied), Some(1));
    assert_eq!(
        seqs_and_paths(&log, "p1").await,
        vec![(1, "a.txt".to_string()), (2, "c.txt".to_string())]
    );
}

#[tokio::test]
async fn test_processor_publishes_logged_changes() {
    let (processor, _, notifier) = processor_over(Arc::new(memory_store()));
    let mut sub = notifier.subscribe("p1");

    let change = FileChange::create("clip.mp4").with_size(5);
    processor
        .process_batch(&ChangeBatch::new("p1", "u1", vec![change.clone()]))
        .await;

    let event = sub.recv().await.unwrap();
    assert_eq!(event.project_id, "p1");
    assert_eq!(event.seq, 1);
    assert_eq!(event.change, change);
}

// ====================================================================================
// SEQUENCES
// ====================================================================================

#[tokio::test]
async fn test_sequence_next_is_plain_read() {
    let store: Arc<dyn ChangeStore> = Arc::new(memory_store());
    let sequencer = SequenceAssigner::new(store);
    assert_eq!(sequencer.next("p1").await.unwrap(), 1);
    assert_eq!(sequencer.next("p1").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_event_log_record_is_serialized_per_project() {
    let store: Arc<dyn ChangeStore> = Arc::new(memory_store());
    let log = Arc::new(EventLog::new(
        store.clone(),
        Arc::new(SequenceAssigner::new(store)),
    ));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let log = log.clone();
        tasks.push(tokio::spawn(async move {
            log.record("p1", &FileChange::create(format!("f{i}.txt")))
                .await
                .map(|entry| entry.seq)
        }));
    }

    let mut seqs = Vec::new();
    for task in tasks {
        seqs.push(task.await.unwrap().unwrap());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=16).collect::<Vec<_>>());
    assert_eq!(log.latest_seq("p1").await.unwrap(), 16);
    assert_eq!(log.sequencer().tracked_projects(), 0);
}

#[tokio::test]
async fn test_sequence_locks_are_released_per_project() {
    let store: Arc<dyn ChangeStore> = Arc::new(memory_store());
    let log = EventLog::new(store.clone(), Arc::new(SequenceAssigner::new(store)));

    for project in ["p1", "p2", "p3"] {
        log.record(project, &FileChange::create("a.txt")).await.unwrap();
    }
    assert_eq!(log.sequencer().tracked_projects(), 0);

    let guard = log.sequencer().lock("p1").await;
    log.sequencer().release("p1");
    assert_eq!(log.sequencer().tracked_projects(), 1);
    drop(guard);
    log.sequencer().release("p1");
    assert_eq!(log.sequencer().tracked_projects(), 0);
}

// ====================================================================================
// QUEUE + FEED
// ====================================================================================

#[tokio::test]
async fn test_back_to_back_enqueues_keep_fifo_order() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());

    assert!(feed
        .enqueue("p1", "u1", vec![FileChange::create("a.txt").with_size(10)])
        .is_accepted());
    assert!(feed
        .enqueue("p1", "u1", vec![FileChange::create("b.txt").with_size(20)])
        .is_accepted());
    feed.shutdown().await;

    assert_eq!(
        seqs_and_paths(feed.log(), "p1").await,
        vec![(1, "a.txt".to_string()), (2, "b.txt".to_string())]
    );
    let a = feed.files().get("p1", "a.txt").await.unwrap().unwrap();
    let b = feed.files().get("p1", "b.txt").await.unwrap().unwrap();
    assert_eq!((a.size, b.size), (10, 20));
}

#[tokio::test]
async fn test_empty_enqueue_has_no_effect() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());
    let mut sub = feed.subscribe("p1");

    assert_eq!(feed.enqueue("p1", "u1", Vec::new()), EnqueueStatus::Empty);
    feed.shutdown().await;

    assert_eq!(feed.queue().processed_batches(), 0);
    assert!(feed.files().list("p1", true).await.unwrap().is_empty());
    assert_eq!(feed.log().latest_seq("p1").await.unwrap(), 0);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_soft_delete_keeps_record_and_is_idempotent() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());

    feed.enqueue("p1", "u1", vec![FileChange::create("x.pdf").with_size(3)]);
    feed.enqueue("p1", "u2", vec![FileChange::delete("x.pdf")]);
    wait_for_processed(feed.queue(), 2).await;

    let first = feed.files().get("p1", "x.pdf").await.unwrap().unwrap();
    let tombstone = first.tombstone.clone().unwrap();
    assert_eq!(tombstone.deleted_by, "u2");
    assert_eq!(first.size, 3);

    feed.enqueue("p1", "u3", vec![FileChange::delete("x.pdf")]);
    feed.shutdown().await;

    let second = feed.files().get("p1", "x.pdf").await.unwrap().unwrap();
    assert_eq!(second.tombstone, Some(tombstone));
    assert_eq!(feed.log().latest_seq("p1").await.unwrap(), 3);
    assert!(feed.files().list("p1", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_change_twice_leaves_identical_record() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());
    let change = FileChange::update("song.mp3")
        .with_size(7)
        .with_hash("abc")
        .with_mtime(1_700_000_000_000);

    feed.enqueue("p1", "u1", vec![change.clone()]);
    wait_for_processed(feed.queue(), 1).await;
    let first = feed.files().get("p1", "song.mp3").await.unwrap().unwrap();

    feed.enqueue("p1", "u1", vec![change.clone()]);
    feed.shutdown().await;
    let second = feed.files().get("p1", "song.mp3").await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(second.mime_type, "audio/mpeg");
    let entries = feed.log().entries_after("p1", 0).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.change == change));
}

#[tokio::test]
async fn test_projects_have_independent_sequences() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());

    feed.enqueue("p1", "u1", vec![FileChange::create("a"), FileChange::create("b")]);
    feed.enqueue("p2", "u1", vec![FileChange::create("c")]);
    feed.enqueue("p1", "u1", vec![FileChange::create("d")]);
    feed.shutdown().await;

    let p1: Vec<i64> = seqs_and_paths(feed.log(), "p1")
        .await
        .into_iter()
        .map(|(seq, _)| seq)
        .collect();
    assert_eq!(p1, vec![1, 2, 3]);
    assert_eq!(feed.log().latest_seq("p2").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_share_one_worker() {
    let store = Arc::new(FaultyStore::new());
    store.set_write_delay(Duration::from_millis(2));
    let feed = Arc::new(ChangeFeed::with_store(store.clone(), &FeedConfig::in_memory()));

    let mut producers = Vec::new();
    for i in 0..20 {
        let feed = feed.clone();
        producers.push(tokio::spawn(async move {
            feed.enqueue("p1", "u1", vec![FileChange::create(format!("f{i}.txt"))])
        }));
    }
    for producer in producers {
        assert!(producer.await.unwrap().is_accepted());
    }
    feed.shutdown().await;

    assert_eq!(store.max_in_flight(), 1);
    assert_eq!(feed.queue().processed_batches(), 20);
    let seqs: Vec<i64> = seqs_and_paths(feed.log(), "p1")
        .await
        .into_iter()
        .map(|(seq, _)| seq)
        .collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_worker_survives_panicking_batch() {
    let store = Arc::new(FaultyStore::new());
    store.panic_on_path("boom.txt");
    let feed = ChangeFeed::with_store(store.clone(), &FeedConfig::in_memory());

    feed.enqueue("p1", "u1", vec![FileChange::create("boom.txt")]);
    feed.enqueue("p1", "u1", vec![FileChange::create("ok.txt")]);
    wait_for_processed(feed.queue(), 2).await;

    assert!(feed.queue().is_running());
    assert_eq!(seqs_and_paths(feed.log(), "p1").await, vec![(1, "ok.txt".to_string())]);
    feed.shutdown().await;
    assert!(!feed.queue().is_running());
}

#[tokio::test]
async fn test_full_queue_rejects_batch() {
    let store = Arc::new(FaultyStore::new());
    store.set_write_delay(Duration::from_millis(50));
    let config = FeedConfig {
        queue_capacity: 1,
        ..FeedConfig::in_memory()
    };
    let feed = ChangeFeed::with_store(store, &config);

    // The current-thread test runtime has not polled the worker yet, so the
    // first batch still occupies the only slot.
    let statuses: Vec<EnqueueStatus> = (0..3)
        .map(|i| feed.enqueue("p1", "u1", vec![FileChange::create(format!("f{i}"))]))
        .collect();
    assert_eq!(statuses[0], EnqueueStatus::Accepted);
    assert_eq!(statuses[2], EnqueueStatus::Full);
    feed.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_after_shutdown_is_closed() {
    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());
    feed.shutdown().await;

    assert_eq!(
        feed.enqueue("p1", "u1", vec![FileChange::create("late.txt")]),
        EnqueueStatus::Closed
    );
    assert!(!feed.queue().is_running());
}

#[tokio::test]
async fn test_follower_sees_every_event_after_feed_dropped() {
    use std::sync::atomic::{AtomicI64, Ordering};

    let feed = ChangeFeed::with_store(Arc::new(memory_store()), &FeedConfig::in_memory());
    let last_seq = Arc::new(AtomicI64::new(0));
    let seen = last_seq.clone();
    let follower = feed.subscribe_with("p1", move |event| {
        seen.store(event.seq, Ordering::SeqCst);
    });

    for i in 0..60 {
        feed.enqueue("p1", "u1", vec![FileChange::create(format!("f{i}.txt"))]);
    }
    feed.shutdown().await;
    drop(feed);

    tokio::time::timeout(Duration::from_secs(5), follower.join())
        .await
        .expect("follower should finish after the feed is dropped");
    assert_eq!(last_seq.load(Ordering::SeqCst), 60);
}
