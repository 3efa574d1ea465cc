//! External collaborators: durable storage, probe client, edge platform API
//! and the routing artifact generator.

pub mod artifact;
pub mod edge_api;
pub mod probe;
pub mod storage;

pub use edge_api::{EdgePlatform, HttpEdgePlatform, RoutingRule};
pub use probe::{ProbeClient, ProbeResult};
pub use storage::{keys, DurableStore, FileStore, MemoryStore, StoreCheckpoints};
