//! Ordering properties for concurrent requests against one shard

mod common;

use std::time::Duration;

use common::{slow_commit_shard, test_shard, wait_for_phase, StaticRequest};
use futures::future::{join, join_all};
use shard_pipeline::{InternalClientRequest, ObjectId, RequestPhase, Shard};
use tokio::time::timeout;

#[tokio::test]
async fn test_earlier_request_locks_and_commits_first() {
    let shard = slow_commit_shard(100);
    let oid = ObjectId::new("obj.a");
    shard.create_object(oid.clone(), vec![0]).await;

    let first = InternalClientRequest::new(shard.clone(), StaticRequest::write(&oid, vec![1]));
    let first_id = first.id();
    let first_phase = first.phase_probe();

    let first_task = tokio::spawn(first.start());
    // First request holds the exclusive object lock through its commit wait.
    wait_for_phase(&first_phase, RequestPhase::Submitted).await;

    let second = InternalClientRequest::new(shard.clone(), StaticRequest::read(&oid));
    let second_id = second.id();
    let second_phase = second.phase_probe();
    let second_task = tokio::spawn(second.start());

    // The second request parks at the lock checkpoint while the first is
    // still only sequenced.
    wait_for_phase(&second_phase, RequestPhase::LockWait).await;
    assert_eq!(first_phase.get(), RequestPhase::Submitted);

    timeout(Duration::from_secs(2), first_task)
        .await
        .expect("first request should complete")
        .unwrap();
    timeout(Duration::from_secs(2), second_task)
        .await
        .expect("second request should complete after the first")
        .unwrap();

    let journal = shard.journal();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].request, first_id);
    assert_eq!(journal[1].request, second_id);
    assert_eq!(shard.pipeline().total_in_flight(), 0);
}

#[tokio::test]
async fn test_interleaved_writers_all_commit_and_drain() {
    let shard = test_shard();
    let oid = ObjectId::new("obj.a");
    shard.create_object(oid.clone(), vec![0]).await;

    let bodies: Vec<_> = (0..8u8)
        .map(|i| {
            InternalClientRequest::new(shard.clone(), StaticRequest::write(&oid, vec![i])).start()
        })
        .collect();
    timeout(Duration::from_secs(2), join_all(bodies))
        .await
        .expect("every writer should complete");

    let journal = shard.journal();
    assert_eq!(journal.len(), 8);
    // Exactly one writer's data survives, and it is the last one journaled.
    let state = shard.obc_loader().peek(&oid).await.unwrap();
    assert_eq!(
        journal.last().unwrap().mutations[0],
        shard_pipeline::SubOp::WriteFull {
            data: state.data.clone()
        }
    );
    assert_eq!(shard.pipeline().total_in_flight(), 0);
}

#[tokio::test]
async fn test_requests_on_different_objects_do_not_serialize_on_locks() {
    let shard = slow_commit_shard(50);
    let a = ObjectId::new("obj.a");
    let b = ObjectId::new("obj.b");
    shard.create_object(a.clone(), vec![0]).await;
    shard.create_object(b.clone(), vec![0]).await;

    let first = InternalClientRequest::new(shard.clone(), StaticRequest::write(&a, vec![1]));
    let second = InternalClientRequest::new(shard.clone(), StaticRequest::write(&b, vec![2]));

    // Both complete; the shared stages order them but the object locks do
    // not conflict.
    timeout(Duration::from_secs(2), join(first.start(), second.start()))
        .await
        .expect("both should complete");
    assert_eq!(shard.journal().len(), 2);
}
