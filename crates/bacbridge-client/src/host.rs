//! Boundary to the home-automation host: entity states, services and
//! state-change notifications.

use bacbridge_core::HostValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Current state of one host entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: String,
    pub state: HostValue,
    pub attributes: BTreeMap<String, HostValue>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<HostValue>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attribute value, `None` when absent or null.
    pub fn attr(&self, name: &str) -> Option<&HostValue> {
        self.attributes.get(name).filter(|value| !value.is_null())
    }

    /// `friendly_name` attribute, else the entity id.
    pub fn friendly_name(&self) -> String {
        self.attr("friendly_name")
            .map(ToString::to_string)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.entity_id.clone())
    }

    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }
}

/// Domain part of an entity id (`light.kitchen` → `light`), empty when the
/// id has no domain.
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or("", |(domain, _)| domain)
}

/// Notification that an entity changed. `new_state` is `None` when the
/// entity was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: String,
    pub new_state: Option<EntityState>,
}

/// Action invocation on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: BTreeMap<String, HostValue>,
}

impl ServiceCall {
    pub fn new(domain: impl Into<String>, service: impl Into<String>, entity_id: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("entity_id".to_string(), HostValue::from(entity_id));
        Self {
            domain: domain.into(),
            service: service.into(),
            data,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// What the bridge needs from the host platform.
pub trait HostPlatform: Send + Sync {
    fn state(&self, entity_id: &str) -> Option<EntityState>;

    /// Whether `domain.service` is currently available. Availability can
    /// change at runtime.
    fn has_service(&self, domain: &str, service: &str) -> bool;

    /// Fire-and-forget service invocation.
    fn call_service(&self, call: ServiceCall);

    /// Changes of the given entities, until the receiver is dropped.
    fn subscribe_state_changes(&self, entity_ids: &[String]) -> mpsc::UnboundedReceiver<StateChange>;
}

struct Watcher {
    entity_ids: BTreeSet<String>,
    sender: mpsc::UnboundedSender<StateChange>,
}

/// In-memory host with recorded service calls.
#[derive(Default)]
pub struct MemoryHost {
    states: Mutex<HashMap<String, EntityState>>,
    services: Mutex<BTreeSet<(String, String)>>,
    calls: Mutex<Vec<ServiceCall>>,
    watchers: Mutex<Vec<Watcher>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `state` and notifies subscribers of that entity.
    pub fn set_state(&self, state: EntityState) {
        let change = StateChange {
            entity_id: state.entity_id.clone(),
            new_state: Some(state.clone()),
        };
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.entity_id.clone(), state);
        self.notify(change);
    }

    pub fn remove_state(&self, entity_id: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity_id);
        self.notify(StateChange {
            entity_id: entity_id.to_string(),
            new_state: None,
        });
    }

    pub fn register_service(&self, domain: &str, service: &str) {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((domain.to_string(), service.to_string()));
    }

    pub fn remove_service(&self, domain: &str, service: &str) {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(domain.to_string(), service.to_string()));
    }

    /// Every service call made so far, oldest first.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify(&self, change: StateChange) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|watcher| {
            if !watcher.entity_ids.contains(&change.entity_id) {
                return !watcher.sender.is_closed();
            }
            watcher.sender.send(change.clone()).is_ok()
        });
    }
}

impl HostPlatform for MemoryHost {
    fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(domain.to_string(), service.to_string()))
    }

    fn call_service(&self, call: ServiceCall) {
        log::debug!("service call {}.{} {:?}", call.domain, call.service, call.data);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn subscribe_state_changes(&self, entity_ids: &[String]) -> mpsc::UnboundedReceiver<StateChange> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Watcher {
                entity_ids: entity_ids.iter().cloned().collect(),
                sender,
            });
        receiver
    }
}
