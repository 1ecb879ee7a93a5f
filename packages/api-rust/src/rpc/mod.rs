//! Conductor RPC: the endpoint that serves a manager to remote adapters, and
//! the middleware pipeline every call passes through.

pub mod middleware;
pub mod server;

pub use server::{serve_on_bus, ManagerDispatcher, RpcEndpoint};
