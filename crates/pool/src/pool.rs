//! Resource pool: a bounded, validating pool over a [`Resource`].
//!
//! `Pool<R>` calls `R::create`, `R::is_valid` and `R::cleanup` directly and
//! tracks every instance it made in exactly one of two sets: *available*
//! (idle) or *in use* (lent to a caller).
//!
//! Locking: a `parking_lot::Mutex` guards both sets and the counters and is
//! never held across an `.await`. A separate async lifecycle lock serializes
//! every factory and cleanup call on one pool, so at most one of them is in
//! flight at any time and a teardown can never interleave with a creation.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

use crate::config::{PoolConfig, PoolStrategy};
use crate::error::{Error, Result};
use crate::events::{CleanupReason, EventBus, PoolEvent};
use crate::managed::{InstanceId, Managed};
use crate::resource::Resource;

// ---------------------------------------------------------------------------
// Pool state
// ---------------------------------------------------------------------------

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Current number of idle instances.
    pub available: usize,
    /// Current number of instances checked out.
    pub in_use: usize,
    /// Total instances ever created.
    pub created: u64,
    /// Total instances ever destroyed.
    pub destroyed: u64,
    /// Total successful acquisitions.
    pub total_acquisitions: u64,
    /// Total releases back to the pool.
    pub total_releases: u64,
}

struct CheckedOut<T> {
    instance: Arc<T>,
    since: Instant,
}

struct State<T> {
    available: IndexMap<InstanceId, Arc<T>>,
    in_use: HashMap<InstanceId, CheckedOut<T>>,
    /// Stale instances waiting for their teardown. Not counted against
    /// `max_size`, but still owned by the pool so shutdown can reap them.
    retiring: HashMap<InstanceId, Arc<T>>,
    closed: bool,
    created: u64,
    destroyed: u64,
    total_acquisitions: u64,
    total_releases: u64,
}

impl<T> State<T> {
    fn new(capacity: usize) -> Self {
        Self {
            available: IndexMap::with_capacity(capacity),
            in_use: HashMap::with_capacity(capacity),
            retiring: HashMap::new(),
            closed: false,
            created: 0,
            destroyed: 0,
            total_acquisitions: 0,
            total_releases: 0,
        }
    }

    fn total(&self) -> usize {
        self.available.len() + self.in_use.len()
    }

    /// Remove the next idle instance and move it to `in_use`.
    fn lend_idle(&mut self, strategy: PoolStrategy) -> Option<(InstanceId, Arc<T>)> {
        let (id, instance) = match strategy {
            PoolStrategy::Fifo => self.available.shift_remove_index(0)?,
            PoolStrategy::Lifo => self.available.pop()?,
        };
        self.lend(id, Arc::clone(&instance));
        Some((id, instance))
    }

    fn lend(&mut self, id: InstanceId, instance: Arc<T>) {
        self.in_use.insert(
            id,
            CheckedOut {
                instance,
                since: Instant::now(),
            },
        );
    }

    /// Remove one tracked instance for teardown: idle first, then checked
    /// out, then retiring.
    fn take_for_teardown(&mut self) -> Option<(InstanceId, Arc<T>)> {
        if let Some(entry) = self.available.shift_remove_index(0) {
            return Some(entry);
        }
        if let Some(id) = self.in_use.keys().next().copied() {
            return self.in_use.remove(&id).map(|entry| (id, entry.instance));
        }
        let id = self.retiring.keys().next().copied()?;
        self.retiring.remove_entry(&id)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.len(),
            in_use: self.in_use.len(),
            created: self.created,
            destroyed: self.destroyed,
            total_acquisitions: self.total_acquisitions,
            total_releases: self.total_releases,
        }
    }
}

/// Where a freshly created instance lands.
#[derive(Clone, Copy)]
enum Slot {
    Available,
    InUse,
}

/// What one pass of the acquire loop decided under the state lock.
enum Step<T> {
    Wait,
    Create,
    Validate(InstanceId, Arc<T>),
}

/// Inner shared state for the pool.
struct PoolInner<R: Resource> {
    resource: R,
    args: R::Args,
    config: PoolConfig,
    state: Mutex<State<R::Instance>>,
    /// Held across every factory and cleanup call.
    lifecycle: tokio::sync::Mutex<()>,
    /// Signalled when an instance is released or a slot is freed.
    returned: Notify,
    events: EventBus,
}

/// Puts a candidate back into `available` if acquire is cancelled while the
/// validator runs.
struct Checkout<'a, R: Resource> {
    inner: &'a PoolInner<R>,
    id: InstanceId,
    armed: bool,
}

impl<'a, R: Resource> Checkout<'a, R> {
    fn new(inner: &'a PoolInner<R>, id: InstanceId) -> Self {
        Self {
            inner,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<R: Resource> Drop for Checkout<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.in_use.remove(&self.id) {
            state.available.insert(self.id, entry.instance);
            drop(state);
            self.inner.returned.notify_one();
        }
    }
}

// ---------------------------------------------------------------------------
// Pool<R>
// ---------------------------------------------------------------------------

/// Generic resource pool.
///
/// Manages at most `max_size` instances of `R::Instance`, creating them on
/// demand, validating idle ones before reuse and tearing them down on
/// [`shutdown`](Self::shutdown). Cloning a `Pool` yields another handle to
/// the same pool.
pub struct Pool<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> std::fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (stats, closed) = {
            let state = self.inner.state.lock();
            (state.stats(), state.closed)
        };
        f.debug_struct("Pool")
            .field("resource_id", &self.inner.resource.id())
            .field("config", &self.inner.config)
            .field("closed", &closed)
            .field("stats", &stats)
            .finish()
    }
}

impl<R: Resource> Pool<R> {
    /// Create a pool and pre-populate it with `min(min_size, max_size)`
    /// instances.
    ///
    /// # Errors
    /// `Error::Configuration` if `config` is invalid (no instance is created).
    /// If the factory fails part-way, the instances created so far are torn
    /// down and the factory error is returned.
    pub async fn new(resource: R, args: R::Args, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                resource,
                args,
                state: Mutex::new(State::new(config.max_size)),
                config,
                lifecycle: tokio::sync::Mutex::new(()),
                returned: Notify::new(),
                events: EventBus::default(),
            }),
        };

        for _ in 0..pool.inner.config.min_size {
            match pool.create(Slot::Available).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    let failures = pool.close_and_reap(CleanupReason::Aborted).await.1;
                    if !failures.is_empty() {
                        tracing::warn!(
                            resource_id = pool.inner.resource.id(),
                            failed = failures.len(),
                            "Rollback after failed pre-population left instances uncleaned"
                        );
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            resource_id = pool.inner.resource.id(),
            available = pool.inner.config.initial_size(),
            max_size = pool.inner.config.max_size,
            "Pool ready"
        );
        Ok(pool)
    }

    /// Acquire an instance.
    ///
    /// Order of preference: an idle instance that passes validation, then a
    /// freshly created one while below `max_size`. When every instance is
    /// checked out, waits up to [`PoolConfig::wait_budget`] for one to be
    /// released. Waiters are not served in any particular order; whichever
    /// wakes first takes the released instance.
    ///
    /// Idle instances that fail validation are destroyed and replaced. A
    /// cleanup failure on that path is logged and otherwise ignored.
    ///
    /// # Errors
    /// - `Error::AcquireTimeout` if nothing was released within the wait budget.
    /// - `Error::PoolClosed` after [`shutdown`](Self::shutdown).
    /// - `Error::RetriesExhausted` if candidates kept failing validation or
    ///   creation kept losing capacity races.
    /// - Factory and validator errors, unchanged.
    pub async fn acquire(&self) -> Result<Managed<R::Instance>> {
        let inner = &self.inner;
        let started = Instant::now();
        let budget = inner.config.max_size.saturating_mul(2).saturating_add(1);
        let mut deadline = None;
        let mut attempts = 0;

        while attempts < budget {
            let step = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(Error::closed(inner.resource.id()));
                }
                if state.in_use.len() >= inner.config.max_size {
                    Step::Wait
                } else if let Some((id, instance)) = state.lend_idle(inner.config.strategy) {
                    Step::Validate(id, instance)
                } else {
                    Step::Create
                }
            };

            match step {
                Step::Wait => {
                    let wait_until =
                        *deadline.get_or_insert_with(|| Instant::now() + inner.config.wait_budget());
                    if let Some((id, instance)) = self.wait_for_idle(started, wait_until).await? {
                        return self.hand_out(id, instance, started);
                    }
                }
                Step::Create => match self.create(Slot::InUse).await? {
                    Some((id, instance)) => return self.hand_out(id, instance, started),
                    None => attempts += 1,
                },
                Step::Validate(id, instance) => {
                    if self.validate(id, &instance).await? {
                        return self.hand_out(id, instance, started);
                    }
                    attempts += 1;
                }
            }
        }

        Err(Error::RetriesExhausted {
            resource_id: inner.resource.id().to_string(),
            attempts,
        })
    }

    /// Return an instance obtained from [`acquire`](Self::acquire).
    ///
    /// The instance goes back to the idle set unconditionally; it is
    /// validated again on its next acquire.
    ///
    /// # Errors
    /// - `Error::InvalidRelease` if the instance is not checked out from this
    ///   pool. Pool state is left untouched.
    /// - `Error::PoolClosed` after [`shutdown`](Self::shutdown).
    pub fn release(&self, managed: Managed<R::Instance>) -> Result<()> {
        let inner = &self.inner;
        let id = managed.id();
        let usage_duration = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Error::closed(inner.resource.id()));
            }
            let Some(entry) = state.in_use.remove(&id) else {
                return Err(Error::InvalidRelease {
                    resource_id: inner.resource.id().to_string(),
                    instance_id: id,
                });
            };
            state.available.insert(id, entry.instance);
            state.total_releases += 1;
            entry.since.elapsed()
        };
        drop(managed);
        inner.returned.notify_one();

        tracing::debug!(resource_id = inner.resource.id(), instance_id = %id, "Released instance");
        inner.events.emit(PoolEvent::Released {
            instance_id: id,
            usage_duration,
        });
        Ok(())
    }

    /// Shut the pool down, tearing down every instance, idle or checked out.
    ///
    /// Every instance is cleaned up exactly once and the call returns only
    /// after all cleanups finished. Pending waiters fail with
    /// `Error::PoolClosed`, as does any later acquire or release.
    ///
    /// Instances are taken out of the pool one at a time, so if this future
    /// is dropped part-way the rest stay tracked and a later `shutdown`
    /// tears them down. Once nothing is left, calling it again does nothing.
    ///
    /// # Errors
    /// `Error::ShutdownIncomplete` carrying every cleanup failure, after all
    /// instances were attempted.
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        let (attempted, failures) = self.close_and_reap(CleanupReason::Shutdown).await;

        tracing::debug!(
            resource_id = inner.resource.id(),
            attempted,
            failed = failures.len(),
            "Pool shut down"
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ShutdownIncomplete {
                resource_id: inner.resource.id().to_string(),
                attempted,
                failures,
            })
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    /// Ids of idle instances, in the order acquire would consider them under
    /// FIFO.
    #[must_use]
    pub fn available_ids(&self) -> Vec<InstanceId> {
        self.inner.state.lock().available.keys().copied().collect()
    }

    /// Ids of checked-out instances, in no particular order.
    #[must_use]
    pub fn in_use_ids(&self) -> Vec<InstanceId> {
        self.inner.state.lock().in_use.keys().copied().collect()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// The settings this pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The resource this pool manages.
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// Subscribe to pool lifecycle events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------------

    /// Create one instance if below `max_size`. `Ok(None)` means no capacity.
    async fn create(&self, slot: Slot) -> Result<Option<(InstanceId, Arc<R::Instance>)>> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        {
            let state = inner.state.lock();
            if state.closed {
                return Err(Error::closed(inner.resource.id()));
            }
            if state.total() >= inner.config.max_size {
                return Ok(None);
            }
        }

        let instance = Arc::new(inner.resource.create(&inner.args).await?);
        let id = InstanceId::new();
        {
            let mut state = inner.state.lock();
            state.created += 1;
            match slot {
                Slot::Available => {
                    state.available.insert(id, Arc::clone(&instance));
                }
                Slot::InUse => state.lend(id, Arc::clone(&instance)),
            }
        }

        tracing::debug!(resource_id = inner.resource.id(), instance_id = %id, "Created instance");
        inner.events.emit(PoolEvent::Created { instance_id: id });
        Ok(Some((id, instance)))
    }

    /// Run the validator on a candidate already moved to `in_use`.
    ///
    /// A rejected candidate is destroyed; a validator error destroys it too
    /// and is passed on.
    async fn validate(&self, id: InstanceId, instance: &R::Instance) -> Result<bool> {
        let inner = &self.inner;
        let checkout = Checkout::new(inner, id);
        let verdict = inner.resource.is_valid(instance).await;
        checkout.disarm();

        match verdict {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::debug!(
                    resource_id = inner.resource.id(),
                    instance_id = %id,
                    "Idle instance failed validation, recycling"
                );
                self.recycle(id, CleanupReason::ValidationFailed).await;
                Ok(false)
            }
            Err(e) => {
                self.recycle(id, CleanupReason::ValidationError).await;
                Err(e)
            }
        }
    }

    /// Move a stale candidate from `in_use` to `retiring` and destroy it,
    /// ignoring cleanup failures.
    ///
    /// If this future is dropped before the teardown starts, the instance
    /// stays in `retiring` and shutdown reaps it.
    async fn recycle(&self, id: InstanceId, reason: CleanupReason) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            let Some(entry) = state.in_use.remove(&id) else {
                // Shutdown took it and owns the teardown.
                return;
            };
            state.retiring.insert(id, entry.instance);
        }
        inner.returned.notify_one();

        let _lifecycle = inner.lifecycle.lock().await;
        let removed = inner.state.lock().retiring.remove(&id);
        let Some(instance) = removed else {
            return;
        };
        let _ = self.reap(id, &instance, reason).await;
    }

    /// Call the reaper on one instance the pool no longer tracks.
    /// The caller holds the lifecycle lock.
    async fn reap(&self, id: InstanceId, instance: &R::Instance, reason: CleanupReason) -> Result<()> {
        let inner = &self.inner;
        let result = inner.resource.cleanup(instance).await;
        inner.state.lock().destroyed += 1;

        match &result {
            Ok(()) => {
                tracing::debug!(
                    resource_id = inner.resource.id(),
                    instance_id = %id,
                    ?reason,
                    "Cleaned up instance"
                );
                inner.events.emit(PoolEvent::CleanedUp {
                    instance_id: id,
                    reason,
                });
            }
            Err(e) => {
                tracing::warn!(
                    resource_id = inner.resource.id(),
                    instance_id = %id,
                    ?reason,
                    error = %e,
                    "Instance cleanup failed"
                );
                inner.events.emit(PoolEvent::CleanupFailed {
                    instance_id: id,
                    reason,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Mark the pool closed and reap every instance it still tracks, one at
    /// a time. Returns how many were attempted and the failures.
    async fn close_and_reap(&self, reason: CleanupReason) -> (usize, Vec<Error>) {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let was_closed = std::mem::replace(&mut inner.state.lock().closed, true);
        if !was_closed {
            inner.returned.notify_waiters();
            inner.events.emit(PoolEvent::Closed);
        }

        let mut attempted = 0;
        let mut failures = Vec::new();
        loop {
            // Taken one by one so the rest stay tracked across a cancellation.
            let next = inner.state.lock().take_for_teardown();
            let Some((id, instance)) = next else {
                break;
            };
            attempted += 1;
            if let Err(e) = self.reap(id, &instance, reason).await {
                failures.push(e);
            }
        }
        (attempted, failures)
    }

    /// Wait until an instance is released (taken directly, without
    /// validation) or a slot frees up (`Ok(None)`, caller retries).
    async fn wait_for_idle(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> Result<Option<(InstanceId, Arc<R::Instance>)>> {
        let inner = &self.inner;
        loop {
            let notified = inner.returned.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a release in between is not missed.
            notified.as_mut().enable();
            {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(Error::closed(inner.resource.id()));
                }
                if let Some(candidate) = state.lend_idle(inner.config.strategy) {
                    return Ok(Some(candidate));
                }
                if state.in_use.len() < inner.config.max_size {
                    return Ok(None);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let waited = started.elapsed();
                tracing::debug!(
                    resource_id = inner.resource.id(),
                    ?waited,
                    "Acquire timed out, all instances busy"
                );
                inner.events.emit(PoolEvent::Exhausted { waited });
                return Err(Error::AcquireTimeout {
                    resource_id: inner.resource.id().to_string(),
                    timeout: inner.config.wait_budget(),
                    max_size: inner.config.max_size,
                });
            }
            tracing::trace!(resource_id = inner.resource.id(), "Acquire waiter woken");
        }
    }

    /// Finish an acquire for an instance already in `in_use`.
    fn hand_out(
        &self,
        id: InstanceId,
        instance: Arc<R::Instance>,
        started: Instant,
    ) -> Result<Managed<R::Instance>> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.closed || !state.in_use.contains_key(&id) {
                // Shutdown started between the decision and now; it reaps the
                // instance if it has not already.
                return Err(Error::closed(inner.resource.id()));
            }
            state.total_acquisitions += 1;
        }

        let waited = started.elapsed();
        tracing::debug!(resource_id = inner.resource.id(), instance_id = %id, ?waited, "Acquired instance");
        inner.events.emit(PoolEvent::Acquired {
            instance_id: id,
            waited,
        });
        Ok(Managed::new(id, instance))
    }
}
