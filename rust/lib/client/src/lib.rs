//! Authenticated API access for the portal backends.
//!
//! Every request goes out with the session's bearer token. A 401 on an
//! authenticated request triggers one role-scoped token refresh and one
//! retry; concurrent 401s share a single refresh. When renewal fails the
//! session is cleared and the caller gets [`ApiError::SessionExpired`].
//!
//! # Usage
//!
//! ```ignore
//! use portal_client::{AuthClient, ClientOptions, Role};
//!
//! let client = AuthClient::new(ClientOptions::new("http://localhost:8080"));
//! client.login(Role::Merchant, &json!({"email": "a@b.c", "password": "secret"})).await?;
//! let products: Vec<Product> = client.get_json("/merchant/products").await?;
//! ```

pub mod client;
pub mod dispatcher;
pub mod endpoints;
pub mod error;
pub mod reauth;
pub mod role;
pub mod session;

#[cfg(test)]
mod client_test;

pub use client::{AuthClient, ClientOptions};
pub use dispatcher::{ApiRequest, RequestDispatcher};
pub use endpoints::{EndpointSet, RoleEndpointMap};
pub use error::{ApiError, RefreshFailure};
pub use reauth::ReauthInterceptor;
pub use role::{Role, RoleParseError};
pub use session::{MemorySessionStore, Session, SessionStore};
