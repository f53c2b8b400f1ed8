//! Actors, roles and the capability check run at the start of every operation
use crate::error::WorkflowError;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Sales,
    /// Head office staff, the only role allowed to approve and roll back.
    #[n(1)]
    Headquarters,
    #[n(2)]
    Construction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Approve,
    ViewHistory,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Estimate,
    Contract,
}

/// Whoever is driving the request. Produced by the surrounding auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String, // bech32 user id
    pub role: Role,
    pub authenticated: bool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sales => "Sales",
            Role::Headquarters => "HQ",
            Role::Construction => "Construction",
        }
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::ViewHistory => "view history",
            Action::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            authenticated: true,
        }
    }
    pub fn signed_out(mut self) -> Self {
        self.authenticated = false;
        self
    }
    /// The reference stored on history records, absent for unauthenticated actors.
    pub fn reference(&self) -> Option<String> {
        self.authenticated.then(|| self.id.clone())
    }
}

/// Capability matrix shared by both document families.
pub fn is_allowed(role: Role, action: Action, resource: Resource) -> bool {
    match (resource, action) {
        (Resource::Estimate | Resource::Contract, Action::Read) => true,
        (
            Resource::Estimate | Resource::Contract,
            Action::Create | Action::Update | Action::Delete | Action::ViewHistory,
        ) => matches!(role, Role::Sales | Role::Headquarters),
        (Resource::Estimate | Resource::Contract, Action::Approve | Action::Rollback) => {
            role == Role::Headquarters
        }
    }
}

pub fn authorize(actor: &Actor, action: Action, resource: Resource) -> Result<(), WorkflowError> {
    if !actor.authenticated {
        return Err(WorkflowError::Forbidden { action, role: None });
    }
    if !is_allowed(actor.role, action, resource) {
        return Err(WorkflowError::Forbidden {
            action,
            role: Some(actor.role),
        });
    }
    Ok(())
}
