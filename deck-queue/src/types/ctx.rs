use serde::{Deserialize, Serialize};

/// Role of the calling actor, as established by the boundary. The core never
/// performs the role check itself; admin operations document the required
/// floor and trust the boundary to enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Member,
    Admin,
}

/// Multi-tenant caller context for queue operations.
///
/// Every producer and admin call is made on behalf of `(tenant, actor, role)`;
/// the boundary authenticates, the core only scopes by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCtx {
    /// Tenant identifier for multi-tenant isolation
    pub tenant_id: String,

    /// Acting user or service principal (audit + metering attribution)
    pub actor_id: String,

    /// Role the boundary established for the actor
    pub role: ActorRole,

    /// Optional trace ID for correlating queue work with the request that
    /// produced it
    pub trace_id: Option<String>,
}

impl JobCtx {
    /// Create a member-role context
    pub fn new(tenant_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            role: ActorRole::Member,
            trace_id: None,
        }
    }

    /// Create an admin-role context
    pub fn admin(tenant_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Admin,
            ..Self::new(tenant_id, actor_id)
        }
    }

    /// Attach a trace ID
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}
