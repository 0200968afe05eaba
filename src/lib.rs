/// Siglat trust service
///
/// Identity and trust lifecycle for the Siglat emergency-response backend:
/// password login with rotating refresh tokens, email and phone ownership
/// challenges, and the administrator-reviewed document verification workflow
/// with its append-only audit trail.

pub mod api;
pub mod audit;
pub mod auth;
pub mod challenge;
pub mod config;
pub mod context;
pub mod credentials;
pub mod db;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod metrics;
pub mod rate_limit;
pub mod secrets;
pub mod server;
pub mod session;
pub mod verification;
