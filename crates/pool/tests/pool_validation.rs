//! Validation before reuse and the recycle path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use reservoir_pool::{Error, Pool, PoolConfig, Resource, Result};

// ---------------------------------------------------------------------------
// Resource with controllable validation and cleanup
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Probe {
    healthy: AtomicBool,
    validator_errors: AtomicBool,
    cleanup_fails: AtomicBool,
    created: AtomicU32,
    validated: AtomicU32,
    cleaned: AtomicU32,
}

struct ProbeResource {
    probe: Arc<Probe>,
}

#[async_trait]
impl Resource for ProbeResource {
    type Args = ();
    type Instance = u32;

    fn id(&self) -> &str {
        "probe"
    }

    async fn create(&self, _args: &()) -> Result<u32> {
        Ok(self.probe.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn is_valid(&self, _instance: &u32) -> Result<bool> {
        self.probe.validated.fetch_add(1, Ordering::SeqCst);
        if self.probe.validator_errors.load(Ordering::SeqCst) {
            return Err(Error::health_check("probe", "PING timed out"));
        }
        Ok(self.probe.healthy.load(Ordering::SeqCst))
    }

    async fn cleanup(&self, _instance: &u32) -> Result<()> {
        self.probe.cleaned.fetch_add(1, Ordering::SeqCst);
        if self.probe.cleanup_fails.load(Ordering::SeqCst) {
            return Err(Error::cleanup("probe", "QUIT rejected"));
        }
        Ok(())
    }
}

async fn pool(probe: &Arc<Probe>, min_size: usize) -> Pool<ProbeResource> {
    Pool::new(
        ProbeResource {
            probe: probe.clone(),
        },
        (),
        PoolConfig {
            min_size,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

fn healthy_probe() -> Arc<Probe> {
    let probe = Arc::new(Probe::default());
    probe.healthy.store(true, Ordering::SeqCst);
    probe
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthy_idle_instance_is_returned_as_is() {
    let probe = healthy_probe();
    let pool = pool(&probe, 1).await;
    let idle = pool.available_ids()[0];

    let conn = pool.acquire().await.unwrap();

    assert_eq!(conn.id(), idle);
    assert_eq!(pool.in_use_ids(), vec![idle]);
    assert_eq!(probe.created.load(Ordering::SeqCst), 1, "no extra factory call");
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 0, "no reaper call");
    assert_eq!(probe.validated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_instances_are_destroyed_and_replaced() {
    let probe = Arc::new(Probe::default()); // always unhealthy
    let pool = pool(&probe, 2).await;
    let originals = pool.available_ids();
    assert_eq!(originals.len(), 2);

    let conn = pool.acquire().await.unwrap();

    assert!(!originals.contains(&conn.id()), "replacement must have a fresh id");
    assert_eq!(pool.in_use_ids(), vec![conn.id()]);
    let stats = pool.stats();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.in_use, 1);
    assert_eq!(stats.destroyed, 2);
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 2);
    assert_eq!(probe.created.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fresh_instances_are_not_validated() {
    let probe = Arc::new(Probe::default());
    let pool = pool(&probe, 1).await;

    let _conn = pool.acquire().await.unwrap();
    assert_eq!(
        probe.validated.load(Ordering::SeqCst),
        1,
        "only the idle candidate is checked"
    );
}

#[tokio::test]
async fn cleanup_failure_during_recycle_is_swallowed() {
    let probe = Arc::new(Probe::default());
    probe.cleanup_fails.store(true, Ordering::SeqCst);
    let pool = pool(&probe, 1).await;
    let stale = pool.available_ids()[0];

    let conn = pool.acquire().await.expect("acquire keeps going past a failed cleanup");
    assert_ne!(conn.id(), stale);
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().destroyed, 1);
}

#[tokio::test]
async fn validator_error_propagates_and_drops_candidate() {
    let probe = Arc::new(Probe::default());
    probe.validator_errors.store(true, Ordering::SeqCst);
    let pool = pool(&probe, 1).await;

    let err = pool.acquire().await.unwrap_err();
    assert!(
        matches!(err, Error::HealthCheck { ref reason, .. } if reason == "PING timed out"),
        "got {err:?}"
    );

    let stats = pool.stats();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.destroyed, 1);

    // Nothing idle left to validate: the next acquire creates a fresh one.
    probe.validator_errors.store(false, Ordering::SeqCst);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(*conn, 1);
}

#[tokio::test]
async fn instance_that_went_stale_while_idle_is_recycled_on_next_acquire() {
    let probe = healthy_probe();
    let pool = pool(&probe, 1).await;

    let conn = pool.acquire().await.unwrap();
    let first = conn.id();
    pool.release(conn).unwrap();

    probe.healthy.store(false, Ordering::SeqCst);
    let conn = pool.acquire().await.unwrap();

    assert_ne!(conn.id(), first);
    assert_eq!(pool.stats().destroyed, 1);
    assert!(!pool.available_ids().contains(&first));
    assert!(!pool.in_use_ids().contains(&first));
}
