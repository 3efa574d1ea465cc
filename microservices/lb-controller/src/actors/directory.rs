//! Actor directory: get-or-create addressing by load balancer name
//!
//! Creating a handle spawns the actor, which reloads its persisted state
//! first; addressing a name after a restart is therefore enough to
//! re-prime it (deliberate self-healing, see the registry's cold start).

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use edgelb_core::{LoadBalancerConfig, Result};

use crate::config::DEFAULT_ACTOR;
use crate::infrastructure::storage::{get_json, keys, DurableStore};
use crate::workflows::MonitorRequest;

use super::handle::LbActorHandle;
use super::load_balancer::LbActor;

pub struct ActorDirectory {
    store: Arc<dyn DurableStore>,
    monitor_tx: mpsc::UnboundedSender<MonitorRequest>,
    actors: DashMap<String, LbActorHandle>,
}

impl ActorDirectory {
    pub fn new(
        store: Arc<dyn DurableStore>,
        monitor_tx: mpsc::UnboundedSender<MonitorRequest>,
    ) -> Self {
        Self {
            store,
            monitor_tx,
            actors: DashMap::new(),
        }
    }

    /// Handle for the actor owning `name`, spawning it on first access.
    pub fn get(&self, name: &str) -> LbActorHandle {
        self.actors
            .entry(name.to_string())
            .or_insert_with(|| {
                LbActor::spawn(
                    name.to_string(),
                    self.store.clone(),
                    self.monitor_tx.clone(),
                )
            })
            .clone()
    }

    /// Handle for `name` only if the actor is already running or has
    /// durable state to reload. Unknown names spawn nothing, so callers
    /// probing arbitrary names cannot grow the directory.
    pub async fn lookup(&self, name: &str) -> Result<Option<LbActorHandle>> {
        if let Some(handle) = self.actors.get(name) {
            return Ok(Some(handle.clone()));
        }
        let stored: Option<LoadBalancerConfig> =
            get_json(self.store.as_ref(), &keys::lb_config(name)).await?;
        if stored.is_none() {
            return Ok(None);
        }
        Ok(Some(self.get(name)))
    }

    /// The well-known default instance: the sink for aggregate broadcasts
    /// only, otherwise an ordinary actor.
    pub fn default_instance(&self) -> LbActorHandle {
        self.get(DEFAULT_ACTOR)
    }

    #[cfg(test)]
    pub(crate) fn insert_handle(&self, name: &str, handle: LbActorHandle) {
        self.actors.insert(name.to_string(), handle);
    }

    #[cfg(test)]
    pub(crate) fn actor_count(&self) -> usize {
        self.actors.len()
    }
}
