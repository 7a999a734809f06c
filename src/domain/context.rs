//! Request Context
//!
//! Metadata about the caller of an operation, used for authorization and tracing.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::user::UserId;

/// Context for a request, built by the HTTP middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Account behind the session token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<UserId>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            requester: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    /// Create context with requesting user
    pub fn with_requester(mut self, user_id: UserId) -> Self {
        self.requester = Some(user_id);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
