//! Conflict detection and resolution.
//!
//! A conflict exists when a record has an unconfirmed local event and a
//! distinct remote event arrives for the same id. Delete precedence is
//! decided by the repository engine before a policy is consulted; policies
//! only ever see two payload-carrying events.

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::Event;
use entisync_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Custom resolver returning the winning payload, or a reason on failure.
pub type ConflictResolver = Arc<dyn Fn(&Conflict<'_>) -> Result<Value, String> + Send + Sync>;

/// A local unconfirmed event competing with a remote event.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    /// Local head event (pending or failed).
    pub local: &'a Event,
    /// Incoming remote event.
    pub remote: &'a Event,
}

impl<'a> Conflict<'a> {
    /// Creates a new conflict.
    pub fn new(local: &'a Event, remote: &'a Event) -> Self {
        Self { local, remote }
    }

    /// Returns the id of the contested record.
    pub fn data_id(&self) -> &'a str {
        self.local.data_id()
    }

    /// Returns the local payload.
    pub fn local_payload(&self) -> ProtocolResult<&'a Value> {
        self.local.payload().ok_or_else(|| {
            ProtocolError::conflict_resolution(self.data_id(), "local event carries no payload")
        })
    }

    /// Returns the remote payload.
    pub fn remote_payload(&self) -> ProtocolResult<&'a Value> {
        self.remote.payload().ok_or_else(|| {
            ProtocolError::conflict_resolution(self.data_id(), "remote event carries no payload")
        })
    }

    /// Returns true if the remote event is at least as recent as the local one.
    pub fn remote_is_newer_or_equal(&self) -> bool {
        self.remote.created_at() >= self.local.created_at()
    }
}

/// How a resolved payload relates to the two contenders.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Local payload kept; the local event stays pending.
    KeepLocal,
    /// Remote payload won; the remote event becomes the confirmed head.
    AcceptRemote,
    /// A new payload that must be pushed as an update.
    Merged(Value),
}

impl Resolution {
    /// Classifies a resolved payload against the conflict it came from.
    ///
    /// A payload equal to the remote one is treated as `AcceptRemote` even if
    /// it also equals the local one, so identical edits converge without a
    /// further push.
    pub fn classify(conflict: &Conflict<'_>, resolved: Value) -> Self {
        if conflict.remote.payload() == Some(&resolved) {
            Resolution::AcceptRemote
        } else if conflict.local.payload() == Some(&resolved) {
            Resolution::KeepLocal
        } else {
            Resolution::Merged(resolved)
        }
    }
}

/// Policy for automatic conflict resolution.
#[derive(Clone, Default)]
pub enum ConflictPolicy {
    /// Newer `created_at` wins; ties favor the remote.
    #[default]
    LastWriteWins,
    /// Remote always wins.
    ServerWins,
    /// Local always wins.
    ClientWins,
    /// Application supplied resolver.
    Custom(ConflictResolver),
}

impl ConflictPolicy {
    /// Creates a custom policy from a closure.
    pub fn custom<F>(resolver: F) -> Self
    where
        F: Fn(&Conflict<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        ConflictPolicy::Custom(Arc::new(resolver))
    }

    /// Returns the winning payload for a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConflictResolution`] if either event lacks a
    /// payload, if a custom resolver fails, or if it returns a non-map value.
    pub fn resolve(&self, conflict: &Conflict<'_>) -> ProtocolResult<Value> {
        let local = conflict.local_payload()?;
        let remote = conflict.remote_payload()?;

        let resolved = match self {
            ConflictPolicy::LastWriteWins => {
                if conflict.remote_is_newer_or_equal() {
                    remote.clone()
                } else {
                    local.clone()
                }
            }
            ConflictPolicy::ServerWins => remote.clone(),
            ConflictPolicy::ClientWins => local.clone(),
            ConflictPolicy::Custom(resolver) => resolver(conflict)
                .map_err(|reason| ProtocolError::conflict_resolution(conflict.data_id(), reason))?,
        };

        if !resolved.is_map() {
            return Err(ProtocolError::conflict_resolution(
                conflict.data_id(),
                format!("resolver returned {} instead of a map", resolved.type_name()),
            ));
        }

        Ok(resolved)
    }

    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last_write_wins",
            ConflictPolicy::ServerWins => "server_wins",
            ConflictPolicy::ClientWins => "client_wins",
            ConflictPolicy::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConflictPolicy::{}", self.name())
    }
}
