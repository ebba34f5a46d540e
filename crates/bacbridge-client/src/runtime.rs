//! Client runtime: discovery, import, diagnostics and subscriptions for one
//! configuration entry.

use crate::app::{BacnetApp, IAm};
use crate::cache::SharedCache;
use crate::config::BridgeConfig;
use crate::consumer::PointConsumer;
use crate::cov::CovDeps;
use crate::diagnostics::DiagnosticsRefresher;
use crate::discovery::{discover_devices, DiscoveredDevice};
use crate::importer::{ImportOutcome, PointImporter};
use crate::reader::PropertyReader;
use crate::signals::{device_id, topics, Signal};
use crate::tasks::TaskPool;
use crate::throttle::RescanRequester;
use crate::BridgeError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

type ConsumerKey = (String, String);

struct RuntimeInner {
    entry_id: String,
    app: Arc<dyn BacnetApp>,
    config: BridgeConfig,
    cache: Arc<SharedCache>,
    pool: Arc<TaskPool>,
    deps: CovDeps,
    reader: Arc<PropertyReader>,
    importer: PointImporter,
    refresher: DiagnosticsRefresher,
    consumers: Mutex<BTreeMap<ConsumerKey, Arc<PointConsumer>>>,
}

/// Runs the bridge for one configuration entry.
///
/// Every background loop lives in the runtime's [`TaskPool`] and stops on
/// [`shutdown`](Self::shutdown).
pub struct ClientRuntime {
    inner: Arc<RuntimeInner>,
}

impl ClientRuntime {
    pub fn new(
        entry_id: impl Into<String>,
        app: Arc<dyn BacnetApp>,
        cache: Arc<SharedCache>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let entry_id = entry_id.into();
        let pool = Arc::new(TaskPool::new());
        let reader = Arc::new(PropertyReader::new(Arc::clone(&app), config.clone()));
        let rescans = Arc::new(RescanRequester::new(
            entry_id.clone(),
            Arc::clone(cache.signals()),
            config.rescan_min_interval(),
        ));
        let deps = CovDeps {
            app: Arc::clone(&app),
            cache: Arc::clone(&cache),
            rescans: Arc::clone(&rescans),
            pool: Arc::clone(&pool),
            config: config.clone(),
        };
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                importer: PointImporter::new(
                    Arc::clone(&reader),
                    Arc::clone(&cache),
                    rescans,
                    entry_id.clone(),
                ),
                refresher: DiagnosticsRefresher::new(Arc::clone(&reader), Arc::clone(&cache), entry_id.clone()),
                entry_id,
                app,
                config,
                cache,
                pool,
                deps,
                reader,
                consumers: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.inner.entry_id
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.inner.cache
    }

    /// Discovers devices, processes each one, then starts the announcement,
    /// rescan and periodic loops. Returns the devices found initially.
    pub async fn start(&self) -> Vec<DiscoveredDevice> {
        let signals = self.inner.cache.signals();
        let announcements = signals.subscribe(&topics::i_am(&self.inner.entry_id));
        let rescans = signals.subscribe(&topics::rescan(&self.inner.entry_id));

        let devices = discover_devices(self.inner.app.as_ref(), &self.inner.config).await;
        log::info!(
            "entry {}: {} device(s) discovered",
            self.inner.entry_id,
            devices.len()
        );
        for device in &devices {
            self.inner.process_device(device.instance, &device.address).await;
        }

        let pool = &self.inner.pool;
        pool.spawn("i-am listener", RuntimeInner::follow_announcements(Arc::clone(&self.inner), announcements));
        pool.spawn("rescan listener", RuntimeInner::follow_rescans(Arc::clone(&self.inner), rescans));
        pool.spawn("diagnostics refresh", RuntimeInner::refresh_periodically(Arc::clone(&self.inner)));
        pool.spawn("rediscovery", RuntimeInner::rediscover_periodically(Arc::clone(&self.inner)));
        devices
    }

    /// Hands an I-Am received by the engine to the runtime. Returns false
    /// when it carries no usable device identifier or source.
    pub fn announce(&self, i_am: &IAm) -> bool {
        let source = i_am
            .source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty());
        let (Some(instance), Some(source)) = (i_am.device_instance(), source) else {
            log::debug!("ignoring I-Am with unparsable payload: {i_am:?}");
            return false;
        };
        if self.inner.config.local_instance == Some(instance) {
            return false;
        }
        self.inner.cache.signals().publish(
            &topics::i_am(&self.inner.entry_id),
            Signal::DeviceAnnounced {
                instance,
                address: source.to_string(),
            },
        );
        true
    }

    /// Runs the per-device pipeline for one device now.
    pub async fn process_device(&self, instance: u32, address: &str) -> ImportOutcome {
        self.inner.process_device(instance, address).await
    }

    pub async fn consumer(&self, device_id: &str, point_key: &str) -> Option<Arc<PointConsumer>> {
        self.inner
            .consumers
            .lock()
            .await
            .get(&(device_id.to_string(), point_key.to_string()))
            .cloned()
    }

    pub async fn consumers(&self) -> Vec<Arc<PointConsumer>> {
        self.inner.consumers.lock().await.values().cloned().collect()
    }

    /// Detaches every consumer and stops all background work.
    pub async fn shutdown(&self) {
        let consumers: Vec<Arc<PointConsumer>> = {
            let mut consumers = self.inner.consumers.lock().await;
            std::mem::take(&mut *consumers).into_values().collect()
        };
        for consumer in &consumers {
            consumer.detach().await;
        }
        self.inner.pool.shutdown().await;
        self.inner.cache.clear_entry(&self.inner.entry_id).await;
        log::info!(
            "entry {}: runtime stopped, {} consumer(s) detached",
            self.inner.entry_id,
            consumers.len()
        );
    }
}

impl RuntimeInner {
    async fn process_device(&self, instance: u32, address: &str) -> ImportOutcome {
        let device_id = device_id(instance);

        let moved = self
            .cache
            .readdress_points(&self.entry_id, &device_id, address)
            .await;
        if moved > 0 {
            log::info!("device {instance} moved to {address}, re-addressed {moved} point(s)");
            self.cache.signals().publish(
                &topics::cov(&self.entry_id, &device_id),
                Signal::Resubscribe {
                    device_id: device_id.clone(),
                },
            );
        }

        self.refresher.refresh(instance, address, true).await;
        let outcome = self.importer.import(&device_id, address, instance, true).await;
        log::debug!("device {instance} import: {outcome:?}");

        let attached = self.attach_consumers(instance, &device_id).await;
        if attached > 0 {
            log::info!("device {instance}: attached {attached} consumer(s)");
        }
        outcome
    }

    async fn attach_consumers(&self, instance: u32, device_id: &str) -> usize {
        let keys = self.cache.point_keys(&self.entry_id, device_id).await;
        let fresh: Vec<Arc<PointConsumer>> = {
            let mut consumers = self.consumers.lock().await;
            keys.into_iter()
                .filter_map(|point_key| {
                    let slot = (device_id.to_string(), point_key.clone());
                    if consumers.contains_key(&slot) {
                        return None;
                    }
                    let consumer = Arc::new(PointConsumer::new(
                        Arc::clone(&self.reader),
                        self.deps.clone(),
                        self.entry_id.clone(),
                        device_id,
                        instance,
                        point_key,
                    ));
                    consumers.insert(slot, Arc::clone(&consumer));
                    Some(consumer)
                })
                .collect()
        };
        for consumer in &fresh {
            let state = consumer.attach().await;
            log::debug!("{} {}: cov {state:?}", device_id, consumer.point_key());
        }
        fresh.len()
    }

    async fn follow_announcements(self: Arc<Self>, mut signals: broadcast::Receiver<Signal>) {
        loop {
            match signals.recv().await {
                Ok(Signal::DeviceAnnounced { instance, address }) => {
                    self.process_device(instance, &address).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => log::debug!("i-am listener missed {missed} signal(s)"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    async fn follow_rescans(self: Arc<Self>, mut signals: broadcast::Receiver<Signal>) {
        loop {
            match signals.recv().await {
                Ok(Signal::RescanRequested { instance }) => self.rescan(instance).await,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => log::debug!("rescan listener missed {missed} signal(s)"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Locates one device again and processes it at its current address.
    async fn rescan(&self, instance: u32) {
        let found = discover_devices(self.app.as_ref(), &self.config)
            .await
            .into_iter()
            .find(|device| device.instance == instance);
        match found {
            Some(device) => {
                self.process_device(device.instance, &device.address).await;
            }
            None => log::debug!("rescan: device {instance} did not answer"),
        }
    }

    async fn refresh_periodically(self: Arc<Self>) {
        let mut ticker = ticker(self.config.diagnostics_interval());
        loop {
            ticker.tick().await;
            for device in self.cache.devices(&self.entry_id).await {
                self.refresher
                    .refresh(device.instance, &device.address, false)
                    .await;
            }
        }
    }

    async fn rediscover_periodically(self: Arc<Self>) {
        let mut ticker = ticker(self.config.rediscovery_interval());
        loop {
            ticker.tick().await;
            for device in discover_devices(self.app.as_ref(), &self.config).await {
                self.process_device(device.instance, &device.address).await;
            }
        }
    }
}

/// Interval whose first tick is one period away.
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
