/// Quota reservation tests
///
/// Reservations are taken at validation time and disposed exactly once at
/// the terminal state; concurrent commands racing for the same quota must
/// never over-commit it.
/// Run with: cargo test --test quota_tests
use cmdflow::gates::memory::{
    FixedQuotaAuthority, MemoryAuditSink, MemoryInventory, MemoryPermissions, MemoryRemote,
};
use cmdflow::quota::ReservationState;
use cmdflow::{
    Collaborators, CommandEngine, CommandId, CommandKind, CommandParams, CommandState,
    DurabilityMode, EngineConfig, EngineError, StepKind,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct World {
    remote: Arc<MemoryRemote>,
    quota: Arc<FixedQuotaAuthority>,
    collab: Collaborators,
}

fn world(capacity: u64) -> World {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let remote = Arc::new(MemoryRemote::new());
    let quota = Arc::new(FixedQuotaAuthority::new([("gold", capacity)]));
    let inventory = Arc::new(MemoryInventory::new());
    inventory.add_image("img-1", "fedora-cloud", 1024);
    let collab = Collaborators {
        permissions: Arc::new(MemoryPermissions::allow_all()),
        remote: remote.clone(),
        quota: quota.clone(),
        audit: Arc::new(MemoryAuditSink::new()),
        inventory,
    };
    World {
        remote,
        quota,
        collab,
    }
}

async fn engine(world: &World, dir: &TempDir) -> Arc<CommandEngine> {
    let config = EngineConfig::new(dir.path())
        .durability(DurabilityMode::None)
        .poll_interval(Duration::from_millis(5))
        .step_timeout(Duration::from_secs(5));
    CommandEngine::open(config, world.collab.clone()).await.unwrap()
}

fn params(bytes: u64) -> CommandParams {
    CommandParams::new("admin", "dom-1")
        .source_image("img-1")
        .quota("gold")
        .requested_bytes(bytes)
}

async fn settle(engine: &CommandEngine, id: CommandId) -> CommandState {
    tokio::time::timeout(Duration::from_secs(10), engine.wait_terminal(id))
        .await
        .expect("command did not reach a terminal state")
        .unwrap()
        .state
}

#[tokio::test]
async fn test_concurrent_reservations_never_overcommit() {
    let dir = TempDir::new().unwrap();
    let w = world(100);
    let engine = engine(&w, &dir).await;

    // Two commands race for 60 of 100 bytes each; the authority would
    // admit either alone, never both
    let (a, b) = tokio::join!(
        engine.submit(CommandKind::ImportImage, params(60)),
        engine.submit(CommandKind::ImportImage, params(60)),
    );

    let (winner, loser) = match (a, b) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        (Ok(_), Ok(_)) => panic!("both reservations admitted against capacity 100"),
        (Err(_), Err(_)) => panic!("neither reservation admitted"),
    };
    assert!(matches!(
        loser,
        EngineError::QuotaExceeded {
            requested: 60,
            available: 40,
            ..
        }
    ));

    assert_eq!(settle(&engine, winner).await, CommandState::EndSuccess);
    let reservation = engine.reservation_for(winner).await.unwrap();
    assert_eq!(reservation.state, ReservationState::Consumed);
    assert_eq!(reservation.bytes, 60);
}

#[tokio::test]
async fn test_sequential_reservations_fill_capacity() {
    let dir = TempDir::new().unwrap();
    let w = world(100);
    let engine = engine(&w, &dir).await;

    let first = engine
        .submit(CommandKind::ImportImage, params(60))
        .await
        .unwrap();
    assert_eq!(settle(&engine, first).await, CommandState::EndSuccess);

    // Consumed charge stays counted against the quota
    let second = engine.submit(CommandKind::ImportImage, params(60)).await;
    assert!(matches!(
        second,
        Err(EngineError::QuotaExceeded { requested: 60, available: 40, .. })
    ));

    let third = engine
        .submit(CommandKind::ImportImage, params(40))
        .await
        .unwrap();
    assert_eq!(settle(&engine, third).await, CommandState::EndSuccess);
}

#[tokio::test]
async fn test_released_reservation_frees_capacity() {
    let dir = TempDir::new().unwrap();
    let w = world(100);
    let engine = engine(&w, &dir).await;

    // Exhaust the retry budget so the command fails and releases its hold
    w.remote.fail_next(StepKind::CopyImage, u32::MAX);
    let failed = engine
        .submit(CommandKind::ImportImage, params(80))
        .await
        .unwrap();
    assert_eq!(settle(&engine, failed).await, CommandState::EndFailure);
    let reservation = engine.reservation_for(failed).await.unwrap();
    assert_eq!(reservation.state, ReservationState::Released);

    // The released 80 bytes are available again
    w.remote.fail_next(StepKind::CopyImage, 0);
    let ok = engine
        .submit(CommandKind::ImportImage, params(80))
        .await
        .unwrap();
    assert_eq!(settle(&engine, ok).await, CommandState::EndSuccess);
}

#[tokio::test]
async fn test_quota_amount_defaults_to_image_size() {
    let dir = TempDir::new().unwrap();
    let w = world(2048);
    let engine = engine(&w, &dir).await;

    // No explicit amount: the resolved image size is reserved
    let id = engine
        .submit(
            CommandKind::ImportImage,
            CommandParams::new("admin", "dom-1")
                .source_image("img-1")
                .quota("gold"),
        )
        .await
        .unwrap();
    assert_eq!(settle(&engine, id).await, CommandState::EndSuccess);

    let reservation = engine.reservation_for(id).await.unwrap();
    assert_eq!(reservation.bytes, 1024);
    assert_eq!(reservation.state, ReservationState::Consumed);
}

#[tokio::test]
async fn test_unreachable_authority_fails_validation_without_hold() {
    let dir = TempDir::new().unwrap();
    let w = world(100);
    let engine = engine(&w, &dir).await;

    w.quota.set_unreachable(true);
    let err = engine
        .submit(CommandKind::ImportImage, params(10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // No hold survives the failed validation
    w.quota.set_unreachable(false);
    let id = engine
        .submit(CommandKind::ImportImage, params(100))
        .await
        .unwrap();
    assert_eq!(settle(&engine, id).await, CommandState::EndSuccess);
}

#[tokio::test]
async fn test_command_without_quota_has_no_reservation() {
    let dir = TempDir::new().unwrap();
    let w = world(100);
    let engine = engine(&w, &dir).await;

    let id = engine
        .submit(
            CommandKind::ImportImage,
            CommandParams::new("admin", "dom-1").source_image("img-1"),
        )
        .await
        .unwrap();
    assert_eq!(settle(&engine, id).await, CommandState::EndSuccess);
    assert!(engine.reservation_for(id).await.is_none());
}
