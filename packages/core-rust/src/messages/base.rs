//! RPC envelope types exchanged between the remote adapter and a conductor
//! endpoint.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are encoded with
//! `rmp_serde::to_vec_named()` so every field travels under its name.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::call::ManagerCall;
use crate::context::RequestContext;
use crate::error::{RpcRejection, WrappedError};

/// Highest RPC API version this build speaks.
pub const RPC_API_VERSION: RpcVersion = RpcVersion::new(1, 44);

// ---------------------------------------------------------------------------
// RpcVersion
// ---------------------------------------------------------------------------

/// `major.minor` version of the conductor RPC API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RpcVersion {
    pub major: u32,
    pub minor: u32,
}

impl RpcVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether an endpoint speaking `self` can serve a request at `requested`.
    ///
    /// Majors must match; the requested minor must not be newer than ours.
    #[must_use]
    pub fn can_serve(self, requested: RpcVersion) -> bool {
        self.major == requested.major && requested.minor <= self.minor
    }
}

impl fmt::Display for RpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ---------------------------------------------------------------------------
// RpcRequest
// ---------------------------------------------------------------------------

/// A single call sent to a conductor topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Correlates the reply with this request.
    pub msg_id: String,
    /// Version the caller needs the endpoint to speak for this call.
    pub version: RpcVersion,
    /// Deadline the caller waits for; endpoints stop working on the call after it.
    pub timeout_ms: u64,
    pub context: RequestContext,
    pub call: ManagerCall,
}

impl RpcRequest {
    /// Build a request with a fresh message id at the call's minimum version.
    #[must_use]
    pub fn new(context: RequestContext, call: ManagerCall, timeout_ms: u64) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            version: call.min_version(),
            timeout_ms,
            context,
            call,
        }
    }
}

// ---------------------------------------------------------------------------
// RpcReply
// ---------------------------------------------------------------------------

/// How a call ended on the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcOutcome {
    /// The manager returned; the bytes are the `MsgPack`-encoded result.
    Success(#[serde(with = "serde_bytes")] Vec<u8>),
    /// The manager raised a domain error.
    Failure(WrappedError),
    /// The endpoint refused to run the call.
    Rejected(RpcRejection),
}

/// Reply correlated to an `RpcRequest` by `msg_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReply {
    pub msg_id: String,
    pub outcome: RpcOutcome,
}

impl RpcReply {
    #[must_use]
    pub fn success(msg_id: impl Into<String>, result: Vec<u8>) -> Self {
        Self {
            msg_id: msg_id.into(),
            outcome: RpcOutcome::Success(result),
        }
    }

    #[must_use]
    pub fn failure(msg_id: impl Into<String>, error: WrappedError) -> Self {
        Self {
            msg_id: msg_id.into(),
            outcome: RpcOutcome::Failure(error),
        }
    }

    #[must_use]
    pub fn rejected(msg_id: impl Into<String>, rejection: RpcRejection) -> Self {
        Self {
            msg_id: msg_id.into(),
            outcome: RpcOutcome::Rejected(rejection),
        }
    }
}
