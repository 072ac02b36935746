//! Repository and client configuration.

use entisync_protocol::ConflictPolicy;

/// Configuration for one repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Payload field holding the record id.
    pub id_field: String,

    /// Offer each new pending event to the strategies right after it is
    /// written. When off, events wait for [`sync`](crate::Repository::sync).
    pub push_on_write: bool,

    /// Maximum number of pending events one `sync()` call offers.
    pub pending_batch_size: usize,

    /// Policy used when a remote event collides with an unconfirmed local one.
    pub conflict_policy: ConflictPolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            push_on_write: true,
            pending_batch_size: 500,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id field name.
    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Sets whether writes push immediately.
    #[must_use]
    pub fn with_push_on_write(mut self, value: bool) -> Self {
        self.push_on_write = value;
        self
    }

    /// Sets the per-sync batch size. Zero is treated as one.
    #[must_use]
    pub fn with_pending_batch_size(mut self, size: usize) -> Self {
        self.pending_batch_size = size.max(1);
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Namespace to switch to after opening. `None` keeps the storage's own.
    pub namespace: Option<String>,
}

impl ClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}
