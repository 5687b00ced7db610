pub mod domain;
pub mod grant;
pub mod group;
pub mod project;
pub mod role;
pub mod token;
pub mod user;

pub use domain::{CreateDomainRequest, Domain, UpdateDomainRequest, DEFAULT_DOMAIN_ID};
pub use grant::{Actor, GrantFilter, RoleAssignment, Scope};
pub use group::{CreateGroupRequest, Group, UpdateGroupRequest};
pub use project::{CreateProjectRequest, Project, UpdateProjectRequest};
pub use role::{CreateRoleRequest, Role, UpdateRoleRequest};
pub use token::{
    IndexEntry, RevocationEntry, TenantRef, TokenPayload, TokenUser, UserTokenIndex, V2, V3,
};
pub use user::{CreateUserRequest, UpdateUserRequest, User};

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
