//! The boundary between the query core and the remote service.

pub mod wire;
pub mod xrpc;

use crate::error::Result;
use crate::models::{QuerySpec, ResultPage, Session, SessionGrant};
use crate::rate_limit::RateLimit;
use async_trait::async_trait;

pub use xrpc::XrpcTransport;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Exchanges a login identifier and secret for session tokens.
    async fn create_session(&self, identifier: &str, secret: &str) -> Result<SessionGrant>;

    /// Fetches the single page described by `spec` (its cursor included).
    async fn fetch_page(&self, session: &Session, spec: &QuerySpec) -> Result<ResultPage>;

    /// Rate-limit window seen on the most recent response, if the service reports one.
    fn rate_limit(&self) -> Option<RateLimit> {
        None
    }
}
