use serde::{Deserialize, Serialize};

/// Per-request context carrying caller identity, tenancy, and tracing information.
///
/// Threaded through every conductor operation and serialized into every RPC
/// envelope. Adapters pass it along untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Unique identifier of this request, `req-<uuid>`.
    pub request_id: String,
    /// Identifier of the calling user, if authenticated.
    pub user_id: Option<String>,
    /// Project (tenant) scope of the call.
    pub project_id: Option<String>,
    /// Whether the caller holds administrative rights.
    pub is_admin: bool,
    /// Roles assigned to the caller for authorization checks.
    pub roles: Vec<String>,
    /// Distributed trace identifier for observability.
    pub trace_id: Option<String>,
}

impl RequestContext {
    /// Create a context for the given user and project with a fresh request id.
    #[must_use]
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            request_id: generate_request_id(),
            user_id: Some(user_id.into()),
            project_id: Some(project_id.into()),
            is_admin: false,
            roles: Vec::new(),
            trace_id: None,
        }
    }

    /// Create an administrative context not bound to any user or project.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            request_id: generate_request_id(),
            user_id: None,
            project_id: None,
            is_admin: true,
            roles: vec!["admin".to_string()],
            trace_id: None,
        }
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

fn generate_request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}
