//! Registry actor
//!
//! Owns the durable map of load balancer names to configs: the source of
//! truth for which load balancers exist. Per-name actors remain the
//! source of truth for health and in-flight work. On cold start the
//! registry replays every stored config into its actor so monitoring
//! resumes without an explicit re-register.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use edgelb_core::{EdgelbError, LoadBalancerConfig, LoadBalancerListing, Result};

use crate::infrastructure::storage::{keys, put_json, DurableStore};

use super::directory::ActorDirectory;
use super::load_balancer::merge_listing;

const MAILBOX_CAPACITY: usize = 64;

pub enum RegistryCommand {
    Register {
        config: LoadBalancerConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    List {
        reply: oneshot::Sender<Vec<LoadBalancerListing>>,
    },
    Get {
        name: String,
        reply: oneshot::Sender<Option<LoadBalancerListing>>,
    },
}

pub struct RegistryActor {
    store: Arc<dyn DurableStore>,
    directory: Arc<ActorDirectory>,
    configs: HashMap<String, LoadBalancerConfig>,
}

impl RegistryActor {
    pub fn spawn(store: Arc<dyn DurableStore>, directory: Arc<ActorDirectory>) -> RegistryHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

        tokio::spawn(async move {
            match RegistryActor::load(store, directory).await {
                Ok(actor) => actor.run(rx).await,
                Err(e) => error!("Failed to load registry state: {}", e),
            }
        });

        RegistryHandle { tx }
    }

    async fn load(store: Arc<dyn DurableStore>, directory: Arc<ActorDirectory>) -> Result<Self> {
        let mut configs = HashMap::new();
        for (_, value) in store.list_prefix(keys::REGISTRY_PREFIX).await? {
            match serde_json::from_value::<LoadBalancerConfig>(value) {
                Ok(config) => {
                    configs.insert(config.name.clone(), config);
                }
                Err(e) => warn!("Skipping undecodable registry entry: {}", e),
            }
        }

        // Cold-start replay: push every stored config back into its actor
        // so probe timers re-arm even if nobody re-registers.
        for config in configs.values() {
            if let Err(e) = directory.get(&config.name).set_config(config.clone()).await {
                warn!(load_balancer = %config.name, "Replay into actor failed: {}", e);
            }
        }
        if !configs.is_empty() {
            info!(count = configs.len(), "Replayed stored load balancers");
        }

        Ok(Self {
            store,
            directory,
            configs,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RegistryCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                RegistryCommand::Register { config, reply } => {
                    let _ = reply.send(self.on_register(config).await);
                }
                RegistryCommand::Delete { name, reply } => {
                    let _ = reply.send(self.on_delete(&name).await);
                }
                RegistryCommand::List { reply } => {
                    let _ = reply.send(self.build_listing().await);
                }
                RegistryCommand::Get { name, reply } => {
                    let _ = reply.send(self.build_one(&name).await);
                }
            }
        }
    }

    /// Upsert only. Pushing the config into the load balancer actor is the
    /// caller's job; the registry does not drive actor timer logic.
    async fn on_register(&mut self, config: LoadBalancerConfig) -> Result<()> {
        config.validate()?;
        put_json(self.store.as_ref(), &keys::registry(&config.name), &config).await?;
        self.configs.insert(config.name.clone(), config);
        Ok(())
    }

    async fn on_delete(&mut self, name: &str) -> Result<()> {
        if !self.configs.contains_key(name) {
            return Err(EdgelbError::NotFound(format!(
                "load balancer '{}' is not registered",
                name
            )));
        }

        // Cascade: actor state and timer first, then the map entry.
        if let Err(e) = self.directory.get(name).delete_all().await {
            warn!(load_balancer = %name, "Actor cleanup during delete failed: {}", e);
        }
        self.store.delete(&keys::registry(name)).await?;
        self.configs.remove(name);

        // Observers attached to the default instance see the new list even
        // if they never attached to the deleted actor.
        let listing = self.build_listing().await;
        if let Err(e) = self.directory.default_instance().broadcast_list(listing).await {
            warn!("Aggregate broadcast after delete failed: {}", e);
        }
        Ok(())
    }

    /// Aggregate listing by concurrent fan-out. One actor failing its
    /// health query must not fail the whole call: the error is logged and
    /// that entry is returned with empty health.
    async fn build_listing(&self) -> Vec<LoadBalancerListing> {
        let queries = self.configs.values().cloned().map(|config| {
            let directory = self.directory.clone();
            async move {
                let health = match directory.get(&config.name).health_snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(
                            load_balancer = %config.name,
                            "Health query failed during listing: {}", e
                        );
                        HashMap::new()
                    }
                };
                merge_listing(config, &health)
            }
        });
        let mut listings = join_all(queries).await;
        listings.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        listings
    }

    async fn build_one(&self, name: &str) -> Option<LoadBalancerListing> {
        let config = self.configs.get(name)?.clone();
        let health = match self.directory.get(name).health_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(load_balancer = %name, "Health query failed: {}", e);
                HashMap::new()
            }
        };
        Some(merge_listing(config, &health))
    }
}

#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    fn gone() -> EdgelbError {
        EdgelbError::Unavailable("registry actor is not running".into())
    }

    pub async fn register(&self, config: LoadBalancerConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Register { config, reply })
            .await
            .map_err(|_| Self::gone())?;
        rx.await.map_err(|_| Self::gone())?
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Delete {
                name: name.to_string(),
                reply,
            })
            .await
            .map_err(|_| Self::gone())?;
        rx.await.map_err(|_| Self::gone())?
    }

    pub async fn list(&self) -> Result<Vec<LoadBalancerListing>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::List { reply })
            .await
            .map_err(|_| Self::gone())?;
        rx.await.map_err(|_| Self::gone())
    }

    pub async fn get(&self, name: &str) -> Result<Option<LoadBalancerListing>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Get {
                name: name.to_string(),
                reply,
            })
            .await
            .map_err(|_| Self::gone())?;
        rx.await.map_err(|_| Self::gone())
    }
}
