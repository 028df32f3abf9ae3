//! Capability gating for portal identities.
//!
//! The who-am-i profile is turned into a [`PermissionResolver`]; UI code
//! asks it (directly, through an [`AccessGate`], or through the
//! [`LandingPlanner`]) what the identity may see.
//!
//! # Permission model
//!
//! - Permissions are dot-delimited ids (`admin.e-commerce.attribute.create`).
//! - A held permission grants itself and every permission below it.
//! - Main admins and members are never gated ([`AccessPolicy`]).
//! - While the profile loads, checks are pending rather than denied.

pub mod gate;
pub mod identity;
pub mod nav;
pub mod permission;
pub mod planner;
pub mod profile;
pub mod resolver;

pub use gate::{AccessDecision, AccessGate, AccessState};
pub use identity::IdentityService;
pub use nav::{NavConfig, NavConfigError, NavNode};
pub use permission::{grants, PermissionSet, Requirement};
pub use planner::{find_first_accessible_path, LandingPlanner};
pub use profile::{NamedPermission, PermissionRef, Profile, RoleGrant, MAIN_ADMIN_TYPE};
pub use resolver::{AccessPolicy, PermissionResolver};
