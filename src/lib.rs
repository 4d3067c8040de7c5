//! Demo embed SSO server: signs embed URLs for a configured host and secret
//! and serves the static demo pages.

pub mod canon;
pub mod config;
pub mod error;
pub mod routes;
pub mod signer;
pub mod types;
pub mod user;
