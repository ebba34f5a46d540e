//! Per-point consumers: the host-facing side of an imported point.

use crate::cache::SharedCache;
use crate::cov::{CovDeps, CovState, CovSubscription};
use crate::reader::PropertyReader;
use crate::signals::{topics, Signal};
use crate::BridgeError;
use bacbridge_core::types::{ObjectId, PropertyId};
use bacbridge_core::{HostValue, Point, PointPlatform};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// One imported point as seen by the host: cached reads, writes, and the
/// COV subscription that keeps the cache current.
pub struct PointConsumer {
    cache: Arc<SharedCache>,
    reader: Arc<PropertyReader>,
    deps: CovDeps,
    subscription: CovSubscription,
    entry_id: String,
    device_id: String,
    point_key: String,
    listener: Mutex<Option<CancellationToken>>,
}

impl PointConsumer {
    pub fn new(
        reader: Arc<PropertyReader>,
        deps: CovDeps,
        entry_id: impl Into<String>,
        device_id: impl Into<String>,
        device_instance: u32,
        point_key: impl Into<String>,
    ) -> Self {
        let entry_id = entry_id.into();
        let device_id = device_id.into();
        let point_key = point_key.into();
        let subscription = CovSubscription::new(
            deps.clone(),
            entry_id.clone(),
            device_id.clone(),
            device_instance,
            point_key.clone(),
        );
        Self {
            cache: Arc::clone(&deps.cache),
            reader,
            deps,
            subscription,
            entry_id,
            device_id,
            point_key,
            listener: Mutex::new(None),
        }
    }

    pub fn point_key(&self) -> &str {
        &self.point_key
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn cov_state(&self) -> CovState {
        self.subscription.state()
    }

    pub fn cov_process_identifier(&self) -> u32 {
        self.subscription.process_identifier()
    }

    /// Subscribes to COV and follows resubscribe signals of the device until
    /// [`detach`](Self::detach).
    pub async fn attach(&self) -> CovState {
        let state = self.subscription.register().await;

        let token = self.deps.pool.child_token();
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let mut signals = self
            .cache
            .signals()
            .subscribe(&topics::cov(&self.entry_id, &self.device_id));
        let subscription = self.subscription.clone();
        let device_id = self.device_id.clone();
        self.deps.pool.spawn("cov-resubscribe", async move {
            loop {
                let signal = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    signal = signals.recv() => signal,
                };
                match signal {
                    Ok(Signal::Resubscribe { device_id: target }) if target == device_id => {
                        let state = subscription.register().await;
                        log::debug!("cov {} resubscribed: {state:?}", subscription.point_key());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        log::debug!("cov listener for {device_id} missed {missed} signal(s)");
                        subscription.register().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        state
    }

    /// Stops following signals and closes the COV subscription.
    pub async fn detach(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = listener {
            token.cancel();
        }
        self.subscription.detach().await;
    }

    pub async fn point(&self) -> Option<Point> {
        self.cache
            .point(&self.entry_id, &self.device_id, &self.point_key)
            .await
    }

    /// Present value in host form; `None` when unknown.
    pub async fn native_value(&self) -> Option<HostValue> {
        self.point().await.and_then(|point| point.native_value())
    }

    pub async fn platform(&self) -> Option<PointPlatform> {
        self.point().await.map(|point| point.platform())
    }

    /// Writes a host value to the remote present value and records it in
    /// the cache once the device acknowledged it.
    pub async fn write_present_value(&self, value: HostValue) -> Result<(), BridgeError> {
        let point = self
            .point()
            .await
            .ok_or_else(|| BridgeError::PointUnavailable(self.point_key.clone()))?;
        let address = point.device_address.trim();
        let identifier = point.object_identifier.trim();
        if address.is_empty() || identifier.is_empty() {
            return Err(BridgeError::AddressingIncomplete);
        }
        let encoded = point
            .encode_write(&value)
            .ok_or_else(|| BridgeError::InvalidValue {
                point: self.point_key.clone(),
                value: value.to_string(),
            })?;
        let object_id: ObjectId = identifier.parse()?;
        let priority = point.write_priority(self.reader.config().write_priority);

        self.reader
            .write(address, object_id, PropertyId::PresentValue, encoded.clone(), priority)
            .await?;
        log::debug!("wrote {encoded} to {object_id} at {address} (priority {priority:?})");

        self.cache
            .update_point(&self.entry_id, &self.device_id, &self.point_key, |point| {
                point.apply_cov(PropertyId::PresentValue, &encoded)
            })
            .await;
        Ok(())
    }
}
