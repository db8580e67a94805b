use flusher::backend::StorageBackend;
use flusher::testing::{InMemoryBackend, Operation};
use flusher::{FlushConfig, Flusher, Scope};
use std::sync::Arc;
use std::time::Duration;

fn config(workers: usize) -> FlushConfig {
    FlushConfig {
        account: "acct".to_string(),
        namespace: "OPENIO".to_string(),
        workers,
        dequeue_timeout: Duration::from_millis(50),
        report_interval: Duration::from_millis(25),
        election_retry_delay: Duration::from_millis(5),
    }
}

fn flusher(backend: &Arc<InMemoryBackend>, workers: usize) -> Flusher {
    let backend: Arc<dyn StorageBackend> = backend.clone();
    Flusher::new(config(workers), backend)
}

fn scopes(args: &[&str]) -> Vec<Scope> {
    args.iter().map(|arg| Scope::parse(arg).unwrap()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bucket_path_end_to_end() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_objects("bucket%2Fpath", 5, 100);
    backend.add_container("bucket%2Fpath%2Fsub");
    // Siblings sharing the textual prefix are not part of the path
    backend.add_objects("bucket%2Fpathology", 3, 10);
    backend.add_objects("bucket", 2, 10);

    let summary = flusher(&backend, 4).run(&scopes(&["bucket/path"])).await;

    assert!(!summary.has_failures());
    assert_eq!(summary.objects.files, 5);
    assert_eq!(summary.objects.bytes, 500);
    assert_eq!(summary.containers.files, 2);
    assert_eq!(summary.elections_failed, 0);

    // Only the container holding objects was flushed
    assert_eq!(backend.calls(Operation::ListObjects), 2);
    assert_eq!(backend.calls(Operation::DeleteObjects), 1);
    assert_eq!(backend.deleted_objects(), 5);

    let mut deleted = backend.deleted_containers();
    deleted.sort();
    assert_eq!(deleted, vec!["bucket%2Fpath", "bucket%2Fpath%2Fsub"]);
    assert_eq!(backend.object_count("bucket%2Fpathology"), 3);
    assert_eq!(backend.object_count("bucket"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_whole_bucket_hierarchy() {
    let backend = Arc::new(InMemoryBackend::new().with_object_page_size(4));
    backend.add_objects("media", 3, 1);
    for i in 0..12 {
        backend.add_objects(&format!("media%2Fdir{i:02}"), 9, 2);
    }
    backend.add_container("media%2Fempty");
    backend.add_objects("media2", 1, 1);

    let summary = flusher(&backend, 5).run(&scopes(&["media"])).await;

    assert_eq!(summary.objects.files, 3 + 12 * 9);
    assert_eq!(summary.objects.bytes, 3 + 12 * 9 * 2);
    assert_eq!(summary.containers.files, 14);
    assert!(!backend.container_exists("media"));
    assert!(backend.container_exists("media2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failing_container_does_not_block_others() {
    let backend = Arc::new(InMemoryBackend::new());
    let m = 10;
    for i in 0..m {
        backend.add_objects(&format!("b%2Fc{i}"), 2, 10);
    }
    backend.fail_permanently(Operation::DeleteObjects, "b%2Fc3", "meta2 unavailable");

    let summary = flusher(&backend, 3).run(&scopes(&["b"])).await;

    // The failing container is abandoned in both phases, nothing else is
    assert_eq!(summary.objects.files, 2 * (m - 1));
    assert_eq!(summary.containers.files, m - 1);
    assert_eq!(summary.abandoned, 2);
    assert!(!summary.has_failures());
    assert_eq!(backend.deleted_containers().len(), (m - 1) as usize);
    assert_eq!(backend.object_count("b%2Fc3"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_election_failures_are_retried_until_success() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_objects("b", 4, 25);
    backend.add_container("b%2Fx");
    backend.fail_elections(Operation::DeleteObjects, "b", 2);
    backend.fail_elections(Operation::DeleteContainer, "b%2Fx", 3);

    let summary = flusher(&backend, 2).run(&scopes(&["b"])).await;

    assert_eq!(summary.elections_failed, 5);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.objects.files, 4);
    assert_eq!(summary.objects.bytes, 100);
    assert_eq!(summary.containers.files, 2);
    assert_eq!(backend.calls(Operation::DeleteContainer), 2 + 3);
    assert!(!backend.container_exists("b"));
    assert!(!backend.container_exists("b%2Fx"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_container_pagination_visits_each_container_once() {
    // 23 containers listed 5 at a time
    let backend = Arc::new(InMemoryBackend::new().with_container_page_size(5));
    for i in 0..23 {
        backend.add_objects(&format!("p%2F{i:03}"), 1, 8);
    }

    let summary = flusher(&backend, 4).run(&scopes(&["p"])).await;

    assert_eq!(summary.objects.files, 23);
    assert_eq!(summary.containers.files, 23);
    // 5 full or partial pages, then the empty page ends the listing
    assert_eq!(backend.calls(Operation::ListContainers), 6);
    assert_eq!(backend.calls(Operation::DeleteObjects), 23);
    assert_eq!(backend.deleted_containers().len(), 23);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enumeration_failure_skips_only_that_path() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_objects("alpha", 2, 10);
    backend.add_objects("beta%2Flogs", 5, 10);
    backend.add_objects("gamma", 1, 10);
    backend.fail_permanently(Operation::ListContainers, "beta%2Flogs", "account service down");

    let summary = flusher(&backend, 2)
        .run(&scopes(&["alpha", "beta/logs", "gamma"]))
        .await;

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].scope.prefix(), "beta%2Flogs");
    assert_eq!(summary.scopes.len(), 2);
    assert_eq!(summary.objects.files, 3);
    assert_eq!(backend.object_count("beta%2Flogs"), 5);
    assert!(!backend.container_exists("alpha"));
    assert!(!backend.container_exists("gamma"));

    let text = summary.to_string();
    assert!(text.contains("Elections failed: 0"));
    assert!(text.contains("beta/logs"));
}
