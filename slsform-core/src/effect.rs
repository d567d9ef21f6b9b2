//! Effect - A single side effect a Plan will perform
//!
//! Effects are values: building one does nothing until a Provider applies it.

use crate::resource::{Resource, ResourceId, State};

/// A change to apply against the remote service
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update an existing resource in place
    Update {
        id: ResourceId,
        identifier: String,
        from: State,
        to: Resource,
    },
    /// Delete an existing resource
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(resource) => &resource.id,
            Effect::Update { id, .. } | Effect::Delete { id, .. } => id,
        }
    }

    /// Short verb for display (e.g., "create")
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Delete { .. } => "delete",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Create(resource) => write!(f, "create {}", resource.id),
            Effect::Update { id, identifier, .. } => write!(f, "update {} ({})", id, identifier),
            Effect::Delete { id, identifier } => write!(f, "delete {} ({})", id, identifier),
        }
    }
}
