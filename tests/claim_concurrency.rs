use chrono::Utc;
use squarepool::{
    adapters::MemoryStore,
    clock::SystemClock,
    domain::{AdminGrant, Caller, Coordinate, GridDefaults, DEFAULT_GRID_ID},
    engine::ClaimantInput,
    error::PoolError,
    services::PoolService,
};
use std::sync::Arc;

fn service() -> Arc<PoolService> {
    let defaults = GridDefaults::default();
    let store = Arc::new(MemoryStore::new(&defaults, Utc::now()));
    Arc::new(PoolService::new(store, Arc::new(SystemClock), defaults))
}

fn claimant(i: usize) -> ClaimantInput {
    ClaimantInput {
        name: format!("Buyer {}", i),
        email: format!("buyer{}@example.com", i),
        player_name: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claims_on_one_square_have_a_single_winner() {
    let service = service();
    let coord = Coordinate::new(3, 7).expect("valid coordinate");

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .claim_square(&Caller::Public, DEFAULT_GRID_ID, coord, &claimant(i))
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("claim task panicked") {
            Ok(()) => winners += 1,
            Err(PoolError::AlreadyClaimed) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 31);

    let view = service
        .grid_view(&Caller::Public, DEFAULT_GRID_ID)
        .await
        .expect("grid view");
    assert_eq!(view.squares_sold, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claims_on_distinct_squares_all_succeed() {
    let service = service();

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let service = Arc::clone(&service);
            let coord =
                Coordinate::new((i / 10) as i64, (i % 10) as i64).expect("valid coordinate");
            tokio::spawn(async move {
                service
                    .claim_square(&Caller::Public, DEFAULT_GRID_ID, coord, &claimant(i))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .expect("claim task panicked")
            .expect("distinct square claim failed");
    }

    let view = service
        .grid_view(&Caller::Public, DEFAULT_GRID_ID)
        .await
        .expect("grid view");
    assert_eq!(view.squares_sold, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_batches_never_double_sell() {
    let service = service();
    let squares: Vec<Coordinate> = (0..5)
        .map(|c| Coordinate::new(0, c).expect("valid coordinate"))
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            let squares = squares.clone();
            tokio::spawn(async move {
                service
                    .claim_squares(&Caller::Public, DEFAULT_GRID_ID, squares, &claimant(i))
                    .await
            })
        })
        .collect();

    let mut claimed = 0;
    for handle in handles {
        let report = handle
            .await
            .expect("batch task panicked")
            .expect("batch rejected up front");
        assert_eq!(report.success_count + report.errors.len(), 5);
        claimed += report.success_count;
    }
    assert_eq!(claimed, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_number_locks_only_one_proceeds() {
    let service = service();
    let admin = AdminGrant::issue();
    service
        .randomize_numbers(&admin, DEFAULT_GRID_ID)
        .await
        .expect("randomize");

    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.lock_numbers(&admin, DEFAULT_GRID_ID).await })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.lock_numbers(&admin, DEFAULT_GRID_ID).await })
    };

    let results = [
        a.await.expect("lock task panicked"),
        b.await.expect("lock task panicked"),
    ];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(PoolError::NumbersLocked))));
}
