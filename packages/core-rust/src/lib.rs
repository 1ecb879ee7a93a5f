//! Conductor Core: operation catalog, manager and API traits, RPC envelopes,
//! and the error taxonomy shared by the local and remote adapters.

pub mod catalog;
pub mod context;
pub mod error;
pub mod messages;
pub mod traits;
pub mod types;

pub use catalog::{find_operation, OperationSpec, ParamSpec, OPERATIONS};
pub use context::RequestContext;
pub use error::{ConductorError, DomainError, ErrorKind, RpcRejection, TransportError, WrappedError};
pub use messages::{ManagerCall, RpcOutcome, RpcReply, RpcRequest, RpcVersion, RPC_API_VERSION};
pub use traits::{ConductorApi, ConductorManager, ConductorResult};
pub use types::{
    record, BandwidthCounters, BdmDestroyTarget, Record, SortDirection, SortOrder, Value,
    VolumeCounters,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
