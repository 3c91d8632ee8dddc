use crate::error::{QueryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u8 = 100;
pub const MAX_PAGE_LIMIT: u8 = 100;

const MAX_HANDLE_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Login identifier and secret, passed through to the service as-is.
#[derive(Clone)]
pub struct Credentials {
    identifier: String,
    secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "credential identifier must not be empty".to_string(),
            ));
        }
        if self.secret.is_empty() {
            return Err(QueryError::InvalidArgument(
                "credential secret must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Identifier sent to the service. Bare usernames get `domain` appended;
    /// emails, DIDs and dotted handles are left alone.
    pub fn login_identifier(&self, domain: Option<&str>) -> String {
        let identifier = self.identifier.trim();
        let identifier = identifier.strip_prefix('@').unwrap_or(identifier);
        match domain {
            Some(domain)
                if !domain.is_empty()
                    && !identifier.contains('.')
                    && !identifier.contains('@')
                    && !identifier.starts_with("did:") =>
            {
                format!("{identifier}.{domain}")
            }
            _ => identifier.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What the service hands back from a successful credential exchange.
#[derive(Clone, Deserialize)]
pub struct SessionGrant {
    pub did: String,
    pub handle: String,
    #[serde(rename = "accessJwt")]
    pub access_token: String,
    #[serde(rename = "refreshJwt")]
    pub refresh_token: String,
}

impl fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGrant")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Authenticated handle bound to one account.
///
/// Clones share a single validity flag, so invalidating the session through
/// the manager is visible to every query holding a copy.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    did: String,
    handle: String,
    access_token: String,
    refresh_token: String,
    created_at: DateTime<Utc>,
    live: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn from_grant(grant: SessionGrant) -> Self {
        Self {
            id: Uuid::new_v4(),
            did: grant.did,
            handle: grant.handle,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            created_at: Utc::now(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_valid(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.live.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("created_at", &self.created_at)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// A DID (`did:plc:...`) or a domain-style handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountId {
    Did(String),
    Handle(String),
}

impl AccountId {
    pub fn parse(raw: &str, default_domain: Option<&str>) -> Result<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(QueryError::InvalidArgument(
                "account identifier must not be empty".to_string(),
            ));
        }

        if trimmed.starts_with("did:") {
            validate_did(trimmed)?;
            return Ok(Self::Did(trimmed.to_string()));
        }

        let handle = match default_domain {
            Some(domain) if !domain.is_empty() && !trimmed.contains('.') => {
                format!("{trimmed}.{domain}")
            }
            _ => trimmed.to_string(),
        }
        .to_ascii_lowercase();
        validate_handle(&handle)?;
        Ok(Self::Handle(handle))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Did(s) | Self::Handle(s) => s,
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_did(did: &str) -> Result<()> {
    let malformed = || QueryError::InvalidArgument(format!("malformed DID: {did}"));
    let mut parts = did.splitn(3, ':');
    let (Some("did"), Some(method), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()) {
        return Err(malformed());
    }
    let id_ok = !id.is_empty()
        && !id.ends_with(':')
        && !id.ends_with('%')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'));
    if !id_ok {
        return Err(malformed());
    }
    Ok(())
}

fn validate_handle(handle: &str) -> Result<()> {
    let malformed = |why: &str| QueryError::InvalidArgument(format!("malformed handle {handle:?}: {why}"));
    if handle.len() > MAX_HANDLE_LEN {
        return Err(malformed("too long"));
    }
    let labels: Vec<&str> = handle.split('.').collect();
    if labels.len() < 2 {
        return Err(malformed("needs a domain"));
    }
    for label in &labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(malformed("bad label length"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(malformed("label starts or ends with '-'"));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(malformed("invalid character"));
        }
    }
    if labels
        .last()
        .and_then(|tld| tld.bytes().next())
        .is_some_and(|b| b.is_ascii_digit())
    {
        return Err(malformed("top-level label starts with a digit"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    SearchPosts,
    Timeline,
    Followers,
    Follows,
    SearchUsers,
}

impl QueryKind {
    /// Operations addressed at an account rather than a free-text query.
    pub const fn takes_account(self) -> bool {
        matches!(self, Self::Timeline | Self::Followers | Self::Follows)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SearchPosts => "search-posts",
            Self::Timeline => "timeline",
            Self::Followers => "followers",
            Self::Follows => "follows",
            Self::SearchUsers => "search-users",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque server-issued pagination token. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page request. A fresh value is built for every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    kind: QueryKind,
    target: String,
    cursor: Option<Cursor>,
    limit: u8,
}

impl QuerySpec {
    pub fn new(kind: QueryKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    #[must_use]
    pub fn with_cursor(&self, cursor: Option<Cursor>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_limit(&self, limit: u8) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
            ..self.clone()
        }
    }

    pub const fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub const fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub const fn limit(&self) -> u8 {
        self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultPage {
    pub items: Vec<ResultItem>,
    pub next_cursor: Option<Cursor>,
}

impl ResultPage {
    pub fn new(items: Vec<ResultItem>, next_cursor: Option<String>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.and_then(Cursor::new),
        }
    }

    /// Final page: no cursor follows it.
    pub const fn last(items: Vec<ResultItem>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultItem {
    Post(Post),
    Profile(Profile),
}

impl ResultItem {
    pub const fn as_post(&self) -> Option<&Post> {
        match self {
            Self::Post(post) => Some(post),
            Self::Profile(_) => None,
        }
    }

    pub const fn as_profile(&self) -> Option<&Profile> {
        match self {
            Self::Profile(profile) => Some(profile),
            Self::Post(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub reply_count: Option<u64>,
    pub repost_count: Option<u64>,
    pub like_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub followers_count: Option<u64>,
    pub follows_count: Option<u64>,
    pub posts_count: Option<u64>,
}
