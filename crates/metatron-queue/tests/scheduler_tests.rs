// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavioural tests for admission, ordering, and counter reconciliation.

use std::sync::Arc;
use std::time::Duration;

use metatron_core::{ExternalBucketing, Identity};
use metatron_queue::{AdmissionPolicy, Denial, JobOutcome, Scheduler};
use metatron_test_utils::{ExecutionLog, MemoryStore, Script, ScriptedJob};
use tokio_util::sync::CancellationToken;

fn user(id: &str) -> Identity {
    Identity::native(id, format!("@{id}"))
}

fn scheduler(max: usize) -> (Scheduler, metatron_queue::QueueProcessor, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (scheduler, processor) = Scheduler::new(AdmissionPolicy::new(max), store.clone());
    (scheduler, processor, store)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn submissions_beyond_cap_are_rejected() {
    let (scheduler, _processor, _) = scheduler(3);
    let log = ExecutionLog::new();
    let alice = user("alice");

    let mut admitted = 0;
    let mut denied = Vec::new();
    for i in 0..7 {
        match scheduler
            .submit(ScriptedJob::new(alice.clone(), &format!("j{i}"), &log).boxed())
            .await
        {
            Ok(_) => admitted += 1,
            Err(denial) => denied.push(denial),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(denied.len(), 4);
    assert!(denied.iter().all(|d| *d == Denial::IdentityLimit { limit: 3 }));
    assert_eq!(scheduler.in_flight(&alice), 3);
}

#[tokio::test]
async fn counter_tracks_queued_and_executing_jobs() {
    let (scheduler, processor, _) = scheduler(5);
    let log = ExecutionLog::new();
    let alice = user("alice");
    let bob = user("bob");

    let (first, release_first) = ScriptedJob::new(alice.clone(), "a1", &log).gated();
    scheduler.submit(first.boxed()).await.unwrap();
    scheduler
        .submit(ScriptedJob::new(alice.clone(), "a2", &log).boxed())
        .await
        .unwrap();
    scheduler
        .submit(ScriptedJob::new(bob.clone(), "b1", &log).boxed())
        .await
        .unwrap();
    assert_eq!(scheduler.in_flight(&alice), 2);
    assert_eq!(scheduler.in_flight(&bob), 1);
    assert_eq!(scheduler.depth(), 3);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processor.run(cancel.clone()));

    // a1 is executing, a2 and b1 are waiting.
    wait_until(|| log.start_order().len() == 1).await;
    assert!(scheduler.is_busy());
    assert_eq!(scheduler.in_flight(&alice), 2);
    assert_eq!(scheduler.depth(), 3);

    release_first.send(()).unwrap();
    wait_until(|| scheduler.depth() == 0).await;
    assert_eq!(scheduler.in_flight(&alice), 0);
    assert_eq!(scheduler.in_flight(&bob), 0);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn every_exit_path_releases_exactly_one_slot() {
    for script in [Script::Succeed, Script::Fail, Script::Panic] {
        let (scheduler, processor, _) = scheduler(4);
        let log = ExecutionLog::new();
        let alice = user("alice");

        scheduler
            .submit(ScriptedJob::new(alice.clone(), "keep", &log).gated().0.boxed())
            .await
            .unwrap();
        let (job, release) = ScriptedJob::new(alice.clone(), "target", &log)
            .with_script(script)
            .gated();
        scheduler.submit(job.boxed()).await.unwrap();
        assert_eq!(scheduler.in_flight(&alice), 2);

        // Pull the jobs by hand so each outcome can be inspected. The first
        // job's gate sender was dropped, so it runs straight through.
        let cancel = CancellationToken::new();
        let first = processor.process_one(&cancel).await;
        assert_eq!(first, Some(JobOutcome::Completed));
        assert_eq!(scheduler.in_flight(&alice), 1);

        drop(release);
        let outcome = processor
            .process_one(&cancel)
            .await
            .expect("target job should run");
        match script {
            Script::Succeed => assert_eq!(outcome, JobOutcome::Completed),
            Script::Fail => assert!(matches!(outcome, JobOutcome::Failed(_))),
            Script::Panic => assert!(matches!(outcome, JobOutcome::Panicked(ref m) if m.contains("target panicked"))),
        }
        assert_eq!(scheduler.in_flight(&alice), 0, "script {script:?}");
        assert!(!scheduler.is_busy());
    }
}

#[tokio::test]
async fn jobs_run_in_submission_order_across_identities() {
    let (scheduler, processor, _) = scheduler(10);
    let log = ExecutionLog::new();
    let labels = ["u1-a", "u2-a", "u1-b", "u3-a", "u2-b", "u1-c"];
    for label in labels {
        let owner = user(&label[..2]);
        scheduler
            .submit(ScriptedJob::new(owner, label, &log).boxed())
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processor.run(cancel.clone()));
    wait_until(|| log.events().len() == labels.len() * 2).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(log.start_order(), labels);
    // Each job ends before the next one starts.
    let events = log.events();
    for pair in events.chunks(2) {
        let started = pair[0].strip_prefix("start:").unwrap();
        assert_eq!(pair[1], format!("end:{started}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_overlap_execution() {
    let (scheduler, processor, _) = scheduler(3);
    let log = ExecutionLog::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processor.run(cancel.clone()));

    let mut tasks = Vec::new();
    for i in 0..40 {
        let scheduler = scheduler.clone();
        let log = Arc::clone(&log);
        tasks.push(tokio::spawn(async move {
            let owner = user(&format!("user{}", i % 8));
            scheduler
                .submit(ScriptedJob::new(owner, &format!("job{i}"), &log).boxed())
                .await
                .is_ok()
        }));
    }
    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }

    wait_until(|| log.events().len() == admitted * 2 && scheduler.depth() == 0).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(admitted >= 24, "each of 8 users should get at least 3 slots");
    assert_eq!(log.max_concurrency(), 1);
    for i in 0..8 {
        assert_eq!(scheduler.in_flight(&user(&format!("user{i}"))), 0);
    }
}

#[tokio::test]
async fn banned_identity_is_rejected_with_empty_counter() {
    let (scheduler, _processor, store) = scheduler(2);
    store.ban("mallory").await;
    let log = ExecutionLog::new();
    let mallory = user("mallory");

    assert_eq!(scheduler.in_flight(&mallory), 0);
    assert!(!scheduler.may_enqueue(&mallory).await);
    let result = scheduler
        .submit(ScriptedJob::new(mallory.clone(), "nope", &log).boxed())
        .await;
    assert_eq!(result, Err(Denial::Banned));
    assert_eq!(scheduler.in_flight(&mallory), 0);
    assert_eq!(scheduler.depth(), 0);
}

#[tokio::test]
async fn freed_slot_admits_next_submission() {
    let (scheduler, processor, _) = scheduler(2);
    let log = ExecutionLog::new();
    let u = user("u");

    let (first, release) = ScriptedJob::new(u.clone(), "1", &log).gated();
    let (second, _hold) = ScriptedJob::new(u.clone(), "2", &log).gated();
    assert!(scheduler.submit(first.boxed()).await.is_ok());
    assert!(scheduler.submit(second.boxed()).await.is_ok());
    assert_eq!(
        scheduler
            .submit(ScriptedJob::new(u.clone(), "3", &log).boxed())
            .await,
        Err(Denial::IdentityLimit { limit: 2 })
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processor.run(cancel.clone()));
    wait_until(|| log.start_order() == ["1"]).await;
    release.send(()).unwrap();
    wait_until(|| log.start_order() == ["1", "2"]).await;

    assert_eq!(scheduler.in_flight(&u), 1);
    assert!(
        scheduler
            .submit(ScriptedJob::new(u.clone(), "4", &log).boxed())
            .await
            .is_ok()
    );

    drop(_hold);
    wait_until(|| scheduler.depth() == 0).await;
    assert_eq!(log.start_order(), ["1", "2", "4"]);
    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn admitted_reports_jobs_ahead() {
    let (scheduler, _processor, _) = scheduler(5);
    let log = ExecutionLog::new();
    let first = scheduler
        .submit(ScriptedJob::new(user("a"), "a", &log).boxed())
        .await
        .unwrap();
    let second = scheduler
        .submit(ScriptedJob::new(user("b"), "b", &log).boxed())
        .await
        .unwrap();
    assert_eq!(first.ahead, 0);
    assert_eq!(second.ahead, 1);
}

#[tokio::test]
async fn total_depth_ceiling_rejects_when_full() {
    let store = Arc::new(MemoryStore::new());
    let policy = AdmissionPolicy::new(5).with_max_total_depth(Some(2));
    let (scheduler, _processor) = Scheduler::new(policy, store);
    let log = ExecutionLog::new();

    for name in ["a", "b"] {
        scheduler
            .submit(ScriptedJob::new(user(name), name, &log).boxed())
            .await
            .unwrap();
    }
    let denied = scheduler
        .submit(ScriptedJob::new(user("c"), "c", &log).boxed())
        .await;
    assert_eq!(denied, Err(Denial::QueueFull { depth: 2 }));
    assert_eq!(scheduler.in_flight(&user("c")), 0);
}

#[tokio::test]
async fn external_principals_share_or_split_buckets() {
    let log = ExecutionLog::new();
    let viewer_a = Identity::external("twitch", "viewer_a");
    let viewer_b = Identity::external("twitch", "viewer_b");

    let shared = AdmissionPolicy::new(1).with_bucketing(ExternalBucketing::Shared);
    let (scheduler, _p) = Scheduler::new(shared, Arc::new(MemoryStore::new()));
    assert!(scheduler.submit(ScriptedJob::new(viewer_a.clone(), "a", &log).boxed()).await.is_ok());
    assert!(scheduler.submit(ScriptedJob::new(viewer_b.clone(), "b", &log).boxed()).await.is_err());

    let split = AdmissionPolicy::new(1).with_bucketing(ExternalBucketing::PerPrincipal);
    let (scheduler, _p) = Scheduler::new(split, Arc::new(MemoryStore::new()));
    assert!(scheduler.submit(ScriptedJob::new(viewer_a, "a", &log).boxed()).await.is_ok());
    assert!(scheduler.submit(ScriptedJob::new(viewer_b, "b", &log).boxed()).await.is_ok());
}

#[tokio::test]
async fn banned_viewer_is_rejected_inside_shared_bucket() {
    let log = ExecutionLog::new();
    let store = Arc::new(MemoryStore::new());
    store.ban("twitch:mallory").await;
    let policy = AdmissionPolicy::new(2).with_bucketing(ExternalBucketing::Shared);
    let (scheduler, _p) = Scheduler::new(policy, store);

    let mallory = Identity::external("twitch", "mallory");
    let denied = scheduler
        .submit(ScriptedJob::new(mallory.clone(), "m", &log).boxed())
        .await;
    assert_eq!(denied, Err(Denial::Banned));
    assert!(!scheduler.may_enqueue(&mallory).await);
    assert_eq!(scheduler.in_flight(&mallory), 0);

    // Other viewers in the same bucket are unaffected.
    let alice = Identity::external("twitch", "alice");
    assert!(scheduler.submit(ScriptedJob::new(alice, "a", &log).boxed()).await.is_ok());
}

#[tokio::test]
async fn banning_the_bucket_shuts_out_every_viewer() {
    let log = ExecutionLog::new();
    let store = Arc::new(MemoryStore::new());
    store.ban("twitch").await;
    let policy = AdmissionPolicy::new(2).with_bucketing(ExternalBucketing::Shared);
    let (scheduler, _p) = Scheduler::new(policy, store);

    for viewer in ["alice", "bob"] {
        let job = ScriptedJob::new(Identity::external("twitch", viewer), viewer, &log);
        assert_eq!(scheduler.submit(job.boxed()).await, Err(Denial::Banned));
    }
}

#[tokio::test]
async fn cancellation_lets_current_job_finish() {
    let (scheduler, processor, _) = scheduler(5);
    let log = ExecutionLog::new();
    let (job, release) = ScriptedJob::new(user("a"), "running", &log).gated();
    scheduler.submit(job.boxed()).await.unwrap();
    scheduler
        .submit(ScriptedJob::new(user("a"), "waiting", &log).boxed())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processor.run(cancel.clone()));
    wait_until(|| log.start_order().len() == 1).await;
    cancel.cancel();
    release.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(log.events(), ["start:running", "end:running"]);
    assert_eq!(scheduler.in_flight(&user("a")), 1);
}

#[tokio::test(start_paused = true)]
async fn long_jobs_are_never_cut_off() {
    let (scheduler, processor, _) = scheduler(2);
    let log = ExecutionLog::new();
    let alice = user("alice");
    let two_hours = Duration::from_secs(2 * 60 * 60);

    let job = ScriptedJob::new(alice.clone(), "slow", &log).with_duration(two_hours);
    scheduler.submit(job.boxed()).await.unwrap();

    let started = tokio::time::Instant::now();
    let cancel = CancellationToken::new();
    assert_eq!(processor.process_one(&cancel).await, Some(JobOutcome::Completed));
    assert!(started.elapsed() >= two_hours);
    assert_eq!(scheduler.in_flight(&alice), 0);
}
