//! Actor layer
//!
//! Each load balancer name is owned by exactly one single-writer actor:
//! a command mailbox drained by one task, so operations addressed to the
//! same name are totally ordered while different names run in parallel.
//! The registry actor owns the durable name -> config map and the
//! aggregate listing.

pub mod command;
pub mod directory;
pub mod handle;
pub mod load_balancer;
pub mod registry;


pub use command::LbCommand;
pub use directory::ActorDirectory;
pub use handle::LbActorHandle;
pub use load_balancer::LbActor;
pub use registry::{RegistryActor, RegistryHandle};
