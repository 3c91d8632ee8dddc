//! XRPC-over-HTTP transport for Bluesky / AT Protocol services.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};

use super::Transport;
use super::wire::{XrpcErrorBody, decode_page};
use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::models::{QueryKind, QuerySpec, ResultPage, Session, SessionGrant};
use crate::rate_limit::RateLimit;

const CREATE_SESSION: &str = "com.atproto.server.createSession";

/// Login failures the service reports with something other than a plain 401.
const LOGIN_REJECTIONS: &[&str] = &[
    "AuthenticationRequired",
    "AuthFactorTokenRequired",
    "AccountTakedown",
];

const STALE_TOKEN_CODES: &[&str] = &["ExpiredToken", "InvalidToken"];

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug)]
pub struct XrpcTransport {
    client: Client,
    base_url: String,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl XrpcTransport {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("skyquery/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| QueryError::Transport(Box::new(e)))?;

        Ok(Self {
            client,
            base_url: service_url.trim_end_matches('/').to_string(),
            rate_limit: Mutex::new(None),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.service_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, method)
    }

    fn record_rate_limit(&self, response: &Response) {
        if let Some(rl) = RateLimit::from_headers(response.headers()) {
            *self
                .rate_limit
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(rl);
        }
    }

    /// Sends the request and splits the response into status and body,
    /// recording rate-limit headers on the way.
    ///
    /// Only failures before a status line are `Transport`. A truncated body
    /// on a success is `InvalidResponse`; on a failure status the body is
    /// dropped and the status alone drives the error mapping.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<(StatusCode, Vec<u8>)> {
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Transport(Box::new(e)))?;
        self.record_rate_limit(&response);
        let status = response.status();
        match response.bytes().await {
            Ok(body) => Ok((status, body.to_vec())),
            Err(e) if status.is_success() => Err(QueryError::InvalidResponse(format!(
                "cannot read response body: {e}"
            ))),
            Err(e) => {
                debug!(status = status.as_u16(), error = %e, "Dropping unreadable error body");
                Ok((status, Vec::new()))
            }
        }
    }
}

fn method_for(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::SearchPosts => "app.bsky.feed.searchPosts",
        QueryKind::Timeline => "app.bsky.feed.getAuthorFeed",
        QueryKind::Followers => "app.bsky.graph.getFollowers",
        QueryKind::Follows => "app.bsky.graph.getFollows",
        QueryKind::SearchUsers => "app.bsky.actor.searchActors",
    }
}

fn query_params(spec: &QuerySpec) -> Vec<(&'static str, String)> {
    let target_key = if spec.kind().takes_account() {
        "actor"
    } else {
        "q"
    };
    let mut params = vec![
        (target_key, spec.target().to_string()),
        ("limit", spec.limit().to_string()),
    ];
    if let Some(cursor) = spec.cursor() {
        params.push(("cursor", cursor.as_str().to_string()));
    }
    params
}

fn error_body(body: &[u8]) -> XrpcErrorBody {
    serde_json::from_slice(body).unwrap_or(XrpcErrorBody {
        error: None,
        message: None,
    })
}

fn describe(err: &XrpcErrorBody, status: StatusCode) -> String {
    err.message
        .clone()
        .or_else(|| err.error.clone())
        .unwrap_or_else(|| status.to_string())
}

/// Maps a non-success response to the login error taxonomy.
fn login_error(status: StatusCode, body: &[u8]) -> QueryError {
    let err = error_body(body);
    let rejected = status == StatusCode::UNAUTHORIZED
        || err
            .error
            .as_deref()
            .is_some_and(|code| LOGIN_REJECTIONS.contains(&code));
    if rejected {
        return QueryError::Authentication(describe(&err, status));
    }
    QueryError::RemoteService {
        status: status.as_u16(),
        code: err.error,
        message: err.message,
    }
}

/// Maps a non-success response to the query error taxonomy.
fn query_error(status: StatusCode, body: &[u8]) -> QueryError {
    let err = error_body(body);
    let stale = status == StatusCode::UNAUTHORIZED
        || err
            .error
            .as_deref()
            .is_some_and(|code| STALE_TOKEN_CODES.contains(&code));
    if stale {
        return QueryError::SessionExpired(describe(&err, status));
    }
    QueryError::RemoteService {
        status: status.as_u16(),
        code: err.error,
        message: err.message,
    }
}

#[async_trait]
impl Transport for XrpcTransport {
    #[instrument(skip(self, secret))]
    async fn create_session(&self, identifier: &str, secret: &str) -> Result<SessionGrant> {
        let request = self
            .client
            .post(self.endpoint(CREATE_SESSION))
            .json(&CreateSessionInput {
                identifier,
                password: secret,
            });
        let (status, body) = self.execute(request).await?;
        if !status.is_success() {
            return Err(login_error(status, &body));
        }
        serde_json::from_slice(&body)
            .map_err(|e| QueryError::InvalidResponse(format!("cannot decode session: {e}")))
    }

    #[instrument(skip(self, session), fields(kind = %spec.kind(), target = spec.target()))]
    async fn fetch_page(&self, session: &Session, spec: &QuerySpec) -> Result<ResultPage> {
        let request = self
            .client
            .get(self.endpoint(method_for(spec.kind())))
            .bearer_auth(session.access_token())
            .query(&query_params(spec));
        let (status, body) = self.execute(request).await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "XRPC call failed");
            return Err(query_error(status, &body));
        }
        decode_page(spec.kind(), &body)
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
