//! End-to-end job runs against a scripted browser and an in-memory store

use std::sync::Arc;
use std::time::Duration;

use bizscout_lib::application::{BroadcastProgress, JobService, LocalTaskQueue, ProgressSink};
use bizscout_lib::domain::repositories::{AttributionRepository, BusinessRepository, JobRepository};
use bizscout_lib::domain::{Job, JobOptions, JobRequest, JobStatus, Source};
use bizscout_lib::infrastructure::config::WorkerConfig;
use bizscout_lib::test_utils::{
    FailingStore, FakeLauncher, MapsEntry, RecordingProgress, ScriptedPage, TestDatabase, maps_page, test_runner,
};

fn pizza_page() -> String {
    maps_page(
        &[
            MapsEntry::named("Joe's Pizza")
                .at("7 Carmine St, New York, NY 10014")
                .phone("(212) 366-1182")
                .rating("4.6"),
            MapsEntry::named("Prince Street Pizza")
                .at("27 Prince St, New York, NY 10012")
                .rating("4.5"),
            MapsEntry::named("Joes Pizza")
                .at("7 Carmine St, New York, NY 10014")
                .rating("4.4"),
            MapsEntry::named("Lucali")
                .at("575 Henry St, Brooklyn, NY 11231")
                .rating("4.7"),
        ],
        0,
        false,
    )
}

fn pizza_launcher() -> Arc<FakeLauncher> {
    Arc::new(FakeLauncher::with_page(ScriptedPage::new(vec![pizza_page()])))
}

async fn pending_job<S: JobRepository>(store: &S, request: JobRequest) -> Job {
    let job = Job::from_request(request);
    store.create_job(&job).await.unwrap();
    job
}

#[tokio::test]
async fn test_successful_run_completes_with_attribution_count() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(db.store());
    let progress = Arc::new(RecordingProgress::default());
    let runner = test_runner(store.clone(), pizza_launcher(), progress.clone()).unwrap();

    let job = pending_job(store.as_ref(), JobRequest::new("pizza", "New York, NY")).await;
    let finished = runner.run(job.id).await.unwrap();

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.results_count, 4);
    assert!(finished.started_at.is_some());
    assert!(finished.completed_at.is_some());

    let stored = store.find_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);

    let attributions = store.find_attributions_for_job(job.id).await.unwrap();
    assert_eq!(attributions.len(), 4);
    assert_eq!(
        attributions.iter().map(|a| a.search_position).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(attributions.iter().all(|a| a.search_term == "pizza near New York, NY"));
    assert!(attributions.iter().all(|a| a.source == Source::Maps));

    // "Joes Pizza" at the same address resolves to the "Joe's Pizza" record
    assert_eq!(store.count_businesses().await.unwrap(), 3);
    assert_eq!(attributions[0].business_id, attributions[2].business_id);

    let values = progress.progress_values();
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {values:?}");
    assert_eq!(values.last(), Some(&100));
    assert!(values[..values.len() - 1].iter().all(|&p| p <= 90));
}

#[tokio::test]
async fn test_failed_run_keeps_last_progress_and_committed_records() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(FailingStore::failing_attributions_after(db.store(), 3));
    let progress = Arc::new(RecordingProgress::default());
    let runner = test_runner(store.clone(), pizza_launcher(), progress.clone()).unwrap();

    let job = pending_job(store.as_ref(), JobRequest::new("pizza", "New York, NY")).await;
    let finished = runner.run(job.id).await.unwrap();

    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.progress, 67);
    assert!(finished.error_message.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(finished.completed_at.is_some());

    let stored = store.find_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.progress, 67);

    // "Lucali" was created before its attribution failed
    assert_eq!(store.count_businesses().await.unwrap(), 3);

    let last = progress.updates().last().cloned().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.progress, 67);
}

#[tokio::test]
async fn test_job_options_filter_and_limit_results() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(db.store());
    let runner = test_runner(store.clone(), pizza_launcher(), Arc::new(RecordingProgress::default())).unwrap();

    let options = JobOptions {
        min_rating: Some(4.5),
        ..JobOptions::default()
    };
    let job = pending_job(store.as_ref(), JobRequest::new("pizza", "New York").with_options(options)).await;
    let finished = runner.run(job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.results_count, 3);

    let options = JobOptions {
        max_results: Some(2),
        ..JobOptions::default()
    };
    let job = pending_job(store.as_ref(), JobRequest::new("pizza", "New York").with_options(options)).await;
    let finished = runner.run(job.id).await.unwrap();
    assert_eq!(finished.results_count, 2);
    assert_eq!(store.find_attributions_for_job(job.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_job_is_not_run() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(db.store());
    let launcher = pizza_launcher();
    let runner = test_runner(store.clone(), launcher.clone(), Arc::new(RecordingProgress::default())).unwrap();

    let mut job = pending_job(store.as_ref(), JobRequest::new("pizza", "New York")).await;
    job.transition_to(JobStatus::Cancelled).unwrap();
    store.update_job(&job).await.unwrap();

    let finished = runner.run(job.id).await.unwrap();

    assert_eq!(finished.status, JobStatus::Cancelled);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn test_unsupported_sources_complete_empty() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(db.store());
    let runner = test_runner(store.clone(), pizza_launcher(), Arc::new(RecordingProgress::default())).unwrap();

    let request = JobRequest::new("pizza", "New York").with_sources(vec![Source::Yelp, Source::Facebook]);
    let job = pending_job(store.as_ref(), request).await;
    let finished = runner.run(job.id).await.unwrap();

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.results_count, 0);
}

#[tokio::test]
async fn test_submitted_job_runs_on_worker_pool() {
    let db = TestDatabase::new().await.unwrap();
    let store = Arc::new(db.store());
    let progress = Arc::new(BroadcastProgress::default());
    let mut updates = progress.subscribe();
    let sink: Arc<dyn ProgressSink> = progress.clone();
    let runner = Arc::new(test_runner(store.clone(), pizza_launcher(), sink).unwrap());

    let queue = Arc::new(LocalTaskQueue::start(runner, &WorkerConfig::default()));
    let service = JobService::new(store.clone(), queue.clone(), queue.queue_name());

    let job = service.submit(JobRequest::new("pizza", "New York")).await.unwrap();

    let terminal = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let update = updates.recv().await.unwrap();
            if update.job_id == job.id && update.status.is_terminal() {
                return update;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(terminal.status, JobStatus::Completed);

    let results = service.results(job.id).await.unwrap();
    assert_eq!(results.job.results_count, 4);
    assert_eq!(results.attributions.len(), 4);

    drop(service);
    if let Ok(queue) = Arc::try_unwrap(queue) {
        queue.shutdown().await;
    }
}
