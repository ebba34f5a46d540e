//! Change-of-value subscriptions for imported points.
//!
//! Each [`CovSubscription`] belongs to one consumer of one point. It opens a
//! subscription through [`BacnetApp::subscribe_cov`], applies notifications
//! to the shared cache from a receive task, renews the lease with a one-shot
//! timer and backs off exponentially when the device refuses.

use crate::app::{BacnetApp, CovContext, CovRequest};
use crate::cache::SharedCache;
use crate::config::BridgeConfig;
use crate::signals::{topics, Signal};
use crate::tasks::TaskPool;
use crate::throttle::RescanRequester;
use crate::BridgeError;
use bacbridge_core::types::object_id::MAX_INSTANCE;
use bacbridge_core::types::ObjectId;
use bacbridge_core::Point;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Largest subscriber process identifier handed out.
pub const MAX_PROCESS_ID: u32 = MAX_INSTANCE;

/// Stable process identifier for one `(entry, device, point)` consumer, in
/// `1..=MAX_PROCESS_ID`.
pub fn cov_process_identifier(entry_id: &str, device_id: &str, point_key: &str) -> u32 {
    // FNV-1a, 32 bit.
    let mut hash: u32 = 0x811c_9dc5;
    for byte in format!("{entry_id}:{device_id}:{point_key}").bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % MAX_PROCESS_ID + 1
}

/// Process identifier rotated by `offset` within `1..=MAX_PROCESS_ID`.
pub fn offset_process_identifier(process_id: u32, offset: u32) -> u32 {
    let rotated = (u64::from(process_id) + u64::from(offset) + u64::from(MAX_PROCESS_ID) - 1)
        % u64::from(MAX_PROCESS_ID);
    rotated as u32 + 1
}

/// Exponential retry delay for one subscription target.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    delay: Duration,
    not_before: Option<Instant>,
    target: Option<(String, ObjectId)>,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap,
            delay: floor,
            not_before: None,
            target: None,
        }
    }

    /// Records the target of the next attempt. A different target than last
    /// time starts over from the floor.
    pub fn observe_target(&mut self, address: &str, object_id: ObjectId) {
        let same = self
            .target
            .as_ref()
            .is_some_and(|(known, id)| known == address && *id == object_id);
        if !same {
            self.target = Some((address.to_string(), object_id));
            self.reset();
        }
    }

    pub fn ready(&self) -> bool {
        self.not_before.map_or(true, |at| Instant::now() >= at)
    }

    /// Time left until the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.not_before
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
    }

    /// Blocks attempts for the current delay and doubles it for next time.
    /// Returns the delay now in force.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.delay;
        self.not_before = Some(Instant::now() + delay);
        self.delay = (delay * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = self.floor;
        self.not_before = None;
    }
}

/// Lifecycle of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovState {
    /// Never registered, or the point has no usable address yet.
    Unregistered,
    Registering,
    Active,
    /// The last attempt or the receive stream failed. Retried after backoff.
    Failed,
    /// The engine or device cannot subscribe. Not retried.
    Unsupported,
    /// The owning consumer detached.
    Closed,
}

struct Receiver {
    token: CancellationToken,
    task: JoinHandle<Box<dyn CovContext>>,
}

struct CovRuntime {
    receiver: Option<Receiver>,
    timer: Option<CancellationToken>,
    backoff: Backoff,
    unsupported: bool,
    closed: bool,
}

struct CovInner {
    app: Arc<dyn BacnetApp>,
    cache: Arc<SharedCache>,
    rescans: Arc<RescanRequester>,
    pool: Arc<TaskPool>,
    config: BridgeConfig,
    entry_id: String,
    device_id: String,
    device_instance: u32,
    point_key: String,
    process_id: u32,
    runtime: Mutex<CovRuntime>,
    state: StdMutex<CovState>,
}

/// Shared collaborators of every subscription of one entry.
#[derive(Clone)]
pub struct CovDeps {
    pub app: Arc<dyn BacnetApp>,
    pub cache: Arc<SharedCache>,
    pub rescans: Arc<RescanRequester>,
    pub pool: Arc<TaskPool>,
    pub config: BridgeConfig,
}

/// COV subscription of one point for one consumer.
///
/// Registration, re-registration and teardown are serialized by an internal
/// lock, so lease expiry and an explicit resubscribe can never open two
/// subscriptions at once.
#[derive(Clone)]
pub struct CovSubscription {
    inner: Arc<CovInner>,
}

impl CovSubscription {
    pub fn new(
        deps: CovDeps,
        entry_id: impl Into<String>,
        device_id: impl Into<String>,
        device_instance: u32,
        point_key: impl Into<String>,
    ) -> Self {
        let entry_id = entry_id.into();
        let device_id = device_id.into();
        let point_key = point_key.into();
        let backoff = Backoff::new(deps.config.cov_retry_floor(), deps.config.cov_retry_cap());
        Self {
            inner: Arc::new(CovInner {
                process_id: cov_process_identifier(&entry_id, &device_id, &point_key),
                app: deps.app,
                cache: deps.cache,
                rescans: deps.rescans,
                pool: deps.pool,
                config: deps.config,
                entry_id,
                device_id,
                device_instance,
                point_key,
                runtime: Mutex::new(CovRuntime {
                    receiver: None,
                    timer: None,
                    backoff,
                    unsupported: false,
                    closed: false,
                }),
                state: StdMutex::new(CovState::Unregistered),
            }),
        }
    }

    pub fn state(&self) -> CovState {
        self.inner.state()
    }

    pub fn process_identifier(&self) -> u32 {
        self.inner.process_id
    }

    pub fn point_key(&self) -> &str {
        &self.inner.point_key
    }

    /// Opens (or reopens) the subscription. Any live subscription is torn
    /// down first. Returns the resulting state.
    pub async fn register(&self) -> CovState {
        CovInner::register(&self.inner).await
    }

    /// Tears the subscription down for good.
    pub async fn detach(&self) {
        let mut runtime = self.inner.runtime.lock().await;
        runtime.closed = true;
        self.inner.teardown(&mut runtime).await;
        self.inner.set_state(CovState::Closed);
    }
}

fn target_of(point: &Point) -> Option<(String, ObjectId)> {
    let address = point.device_address.trim();
    if address.is_empty() {
        return None;
    }
    let object_id = point
        .object_identifier
        .parse::<ObjectId>()
        .unwrap_or_else(|_| ObjectId::new(point.point_type.object_type(), point.object_instance));
    Some((address.to_string(), object_id))
}

impl CovInner {
    fn state(&self) -> CovState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CovState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn register(self: &Arc<Self>) -> CovState {
        let Some(point) = self
            .cache
            .point(&self.entry_id, &self.device_id, &self.point_key)
            .await
        else {
            log::debug!("cov: {} not cached, nothing to subscribe", self.point_key);
            return self.state();
        };
        let Some((address, object_id)) = target_of(&point) else {
            log::debug!("cov: {} has no address yet", self.point_key);
            return self.state();
        };

        let mut runtime = self.runtime.lock().await;
        if runtime.closed {
            return CovState::Closed;
        }
        if runtime.unsupported {
            return CovState::Unsupported;
        }
        runtime.backoff.observe_target(&address, object_id);
        if !runtime.backoff.ready() {
            log::trace!(
                "cov: {} backing off for {:?}",
                self.point_key,
                runtime.backoff.remaining()
            );
            return self.state();
        }

        self.teardown(&mut runtime).await;
        self.set_state(CovState::Registering);

        let mut outcome = Err(BridgeError::ExistingContext);
        for offset in 0..self.config.cov_offset_attempts {
            let request = CovRequest {
                address: address.clone(),
                object_id,
                subscriber_process_id: offset_process_identifier(self.process_id, offset),
                issue_confirmed: false,
                lifetime_seconds: self.config.cov_lease_secs,
            };
            outcome = timeout(self.config.read_timeout(), self.app.subscribe_cov(request))
                .await
                .map_err(BridgeError::from)
                .and_then(|result| result);
            if !matches!(outcome, Err(BridgeError::ExistingContext)) {
                break;
            }
            log::debug!("cov: process id in use for {object_id} at {address}, rotating");
        }

        match outcome {
            Ok(context) => {
                runtime.backoff.reset();
                let token = self.pool.child_token();
                // Joined by teardown, which closes the context it returns.
                let task = tokio::spawn(Self::receive(Arc::clone(self), context, token.clone()));
                runtime.receiver = Some(Receiver { token, task });
                runtime.timer = Some(self.schedule(self.config.cov_lease()));
                self.set_state(CovState::Active);
                log::debug!("cov: subscribed {object_id} at {address}");
                CovState::Active
            }
            Err(err) if err.is_capability_absence() => {
                log::debug!("cov: {object_id} at {address} cannot be subscribed: {err}");
                runtime.unsupported = true;
                self.set_state(CovState::Unsupported);
                CovState::Unsupported
            }
            Err(err) => {
                log::debug!("cov: subscribe {object_id} at {address} failed: {err}");
                self.rescans.request(self.device_instance);
                let delay = runtime.backoff.record_failure();
                runtime.timer = Some(self.schedule(delay));
                self.set_state(CovState::Failed);
                CovState::Failed
            }
        }
    }

    /// One-shot pool task that re-registers after `delay` unless the
    /// returned token is cancelled first.
    fn schedule(self: &Arc<Self>, delay: Duration) -> CancellationToken {
        let token = self.pool.child_token();
        let cancelled = token.clone();
        let weak = Arc::downgrade(self);
        let delay = delay.max(Duration::from_secs(1));
        self.pool.spawn("cov timer", async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(inner) = weak.upgrade() {
                Self::register(&inner).await;
            }
        });
        token
    }

    /// Backs off after the receive stream broke, unless the subscription was
    /// re-registered or closed in the meantime.
    async fn retry_after_receive_failure(self: Arc<Self>) {
        let mut runtime = self.runtime.lock().await;
        if runtime.closed || self.state() != CovState::Failed {
            return;
        }
        if let Some(timer) = runtime.timer.take() {
            timer.cancel();
        }
        let delay = runtime.backoff.record_failure();
        log::debug!("cov: resubscribing {} in {delay:?}", self.point_key);
        runtime.timer = Some(self.schedule(delay));
    }

    async fn receive(
        self: Arc<Self>,
        mut context: Box<dyn CovContext>,
        token: CancellationToken,
    ) -> Box<dyn CovContext> {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = context.next_value() => next,
            };
            match next {
                Ok((property, value)) => {
                    let applied = self
                        .cache
                        .update_point(&self.entry_id, &self.device_id, &self.point_key, |point| {
                            point.apply_cov(property, &value)
                        })
                        .await;
                    log::trace!("cov: {} {property} applied={applied:?}", self.point_key);
                }
                Err(err) => {
                    log::debug!("cov: receive loop for {} failed: {err}", self.point_key);
                    self.set_state(CovState::Failed);
                    self.cache.signals().publish(
                        &topics::points(&self.entry_id, &self.device_id),
                        Signal::PointsChanged {
                            device_id: self.device_id.clone(),
                        },
                    );
                    self.pool
                        .spawn("cov retry", Self::retry_after_receive_failure(Arc::clone(&self)));
                    break;
                }
            }
        }
        context
    }

    /// Stops the timer and the receive task, then closes the context.
    /// Failures are logged and swallowed.
    async fn teardown(&self, runtime: &mut CovRuntime) {
        if let Some(timer) = runtime.timer.take() {
            timer.cancel();
        }
        let Some(receiver) = runtime.receiver.take() else {
            return;
        };
        receiver.token.cancel();
        match receiver.task.await {
            Ok(mut context) => {
                if timeout(self.config.cov_close_timeout(), context.close())
                    .await
                    .is_err()
                {
                    log::debug!("cov: closing subscription of {} timed out", self.point_key);
                }
            }
            Err(err) => log::debug!("cov: receive task of {} ended abnormally: {err}", self.point_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{cov_process_identifier, offset_process_identifier, Backoff, MAX_PROCESS_ID};
    use bacbridge_core::types::{ObjectId, ObjectType};
    use std::time::Duration;

    #[test]
    fn process_identifier_is_stable_and_in_range() {
        let pid = cov_process_identifier("entry", "client_1001", "ai_5");
        assert_eq!(pid, cov_process_identifier("entry", "client_1001", "ai_5"));
        assert!((1..=MAX_PROCESS_ID).contains(&pid));
        assert_ne!(pid, cov_process_identifier("entry", "client_1001", "ai_6"));
    }

    #[test]
    fn offsets_wrap_within_range() {
        assert_eq!(offset_process_identifier(7, 0), 7);
        assert_eq!(offset_process_identifier(7, 2), 9);
        assert_eq!(offset_process_identifier(MAX_PROCESS_ID, 1), 1);
        assert_eq!(offset_process_identifier(MAX_PROCESS_ID - 1, 2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(300));
        let target = ObjectId::new(ObjectType::AnalogInput, 5);
        backoff.observe_target("10.0.0.5", target);
        assert!(backoff.ready());

        let delays: Vec<u64> = (0..7).map(|_| backoff.record_failure().as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 300, 300]);
        assert!(!backoff.ready());

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(backoff.ready());
    }

    #[tokio::test(start_paused = true)]
    async fn new_target_resets_backoff() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(300));
        let target = ObjectId::new(ObjectType::AnalogInput, 5);
        backoff.observe_target("10.0.0.5", target);
        backoff.record_failure();
        backoff.record_failure();
        assert!(!backoff.ready());

        backoff.observe_target("10.0.0.5", target);
        assert!(!backoff.ready());

        backoff.observe_target("10.0.0.9", target);
        assert!(backoff.ready());
        assert_eq!(backoff.record_failure(), Duration::from_secs(10));
    }
}
