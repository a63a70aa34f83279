use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Appointments,
    Clients,
    Branches,
    Holidays,
    Users,
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Create,
    Update,
    Delete,
}

use Capability::*;

const ALL: &[Capability] = &[Read, Create, Update, Delete];
const READ_UPDATE: &[Capability] = &[Read, Update];
const READ_CREATE_UPDATE: &[Capability] = &[Read, Create, Update];
const READ_ONLY: &[Capability] = &[Read];
const NONE: &[Capability] = &[];

/// What a role may do on a resource. Adding a role or a resource fails to
/// compile until this table covers it.
pub fn capabilities(role: Role, resource: Resource) -> &'static [Capability] {
    match (role, resource) {
        (Role::Admin, _) => ALL,

        (Role::Manager, Resource::Appointments) => READ_CREATE_UPDATE,
        (Role::Manager, Resource::Clients) => READ_UPDATE,
        (Role::Manager, Resource::Branches) => READ_ONLY,
        (Role::Manager, Resource::Holidays) => ALL,
        (Role::Manager, Resource::Users) => READ_CREATE_UPDATE,
        (Role::Manager, Resource::Notifications) => READ_UPDATE,

        (Role::Agent, Resource::Appointments) => READ_UPDATE,
        (Role::Agent, Resource::Clients) => READ_ONLY,
        (Role::Agent, Resource::Branches) => READ_ONLY,
        (Role::Agent, Resource::Holidays) => READ_ONLY,
        (Role::Agent, Resource::Users) => NONE,
        (Role::Agent, Resource::Notifications) => READ_UPDATE,
    }
}

pub fn allows(role: Role, resource: Resource, capability: Capability) -> bool {
    capabilities(role, resource).contains(&capability)
}

pub fn ensure_capability(auth: &AuthContext, resource: Resource, capability: Capability) -> Result<(), ApiError> {
    if allows(auth.role, resource, capability) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            format!("{:?} cannot {:?} {:?}", auth.role, capability, resource).to_lowercase(),
        ))
    }
}
