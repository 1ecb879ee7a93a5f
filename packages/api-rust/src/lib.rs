//! Conductor API: local and remote adapters over a conductor manager, the
//! RPC endpoint that serves a manager on a topic, and the in-process bus.

pub mod adapter;
pub mod config;
pub mod factory;
pub mod local;
pub mod manager;
pub mod remote;
pub mod rpc;
pub mod telemetry;
pub mod translate;
pub mod transport;

#[cfg(test)]
mod testing;

pub use adapter::{AdapterMode, ConductorAdapter, COMPUTE_TOPIC};
pub use config::{ConductorArgs, ConductorConfig, ConfigError};
pub use factory::build_conductor_api;
pub use local::{Local, LocalApi};
pub use manager::MemoryManager;
pub use remote::{ConductorRpcClient, Remote, RemoteApi};
pub use rpc::{serve_on_bus, ManagerDispatcher, RpcEndpoint};
pub use translate::{translate, ExceptionTranslator};
pub use transport::{InMemoryBus, RpcTransport};
