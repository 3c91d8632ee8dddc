#![allow(dead_code)]

use async_trait::async_trait;
use skyquery::{
    Author, Post, Profile, QueryError, QueryFacade, QueryKind, QuerySpec, RateLimit, ResultItem,
    ResultPage, Session, SessionGrant, SessionManager, Transport,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const HANDLE: &str = "alice.bsky.social";
pub const PASSWORD: &str = "app-password";
pub const DID: &str = "did:plc:alice";

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Remote(u16),
    Expired,
    Transport,
}

impl Failure {
    fn to_error(self) -> QueryError {
        match self {
            Self::Remote(status) => QueryError::RemoteService {
                status,
                code: Some("InternalServerError".to_string()),
                message: None,
            },
            Self::Expired => QueryError::SessionExpired("ExpiredToken".to_string()),
            Self::Transport => QueryError::Transport("connection reset by peer".into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Page {
        items: Vec<ResultItem>,
        next: Option<String>,
    },
    Fail(Failure),
}

impl Scripted {
    fn next(&self) -> Option<&str> {
        match self {
            Self::Page { next, .. } => next.as_deref(),
            Self::Fail(_) => None,
        }
    }
}

/// In-memory stand-in for the remote service. Page `n` of a script is
/// served for the cursor handed out by page `n - 1`.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<(QueryKind, String), Vec<Scripted>>>,
    login_failure: Mutex<Option<Failure>>,
    rate_limit: Mutex<Option<RateLimit>>,
    issued: AtomicUsize,
    pub logins: AtomicUsize,
    pub fetches: AtomicUsize,
    pub requests: Mutex<Vec<QuerySpec>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `pages` for one target, chaining them with cursors `c1`, `c2`, ...
    pub fn pages(&self, kind: QueryKind, target: &str, pages: Vec<Vec<ResultItem>>) {
        let count = pages.len();
        let script = pages
            .into_iter()
            .enumerate()
            .map(|(i, items)| Scripted::Page {
                items,
                next: (i + 1 < count).then(|| format!("c{}", i + 1)),
            })
            .collect();
        self.script(kind, target, script);
    }

    pub fn script(&self, kind: QueryKind, target: &str, script: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert((kind, target.to_string()), script);
    }

    pub fn fail_logins_with(&self, failure: Failure) {
        *self.login_failure.lock().unwrap() = Some(failure);
    }

    pub fn set_rate_limit(&self, rate_limit: RateLimit) {
        *self.rate_limit.lock().unwrap() = Some(rate_limit);
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QuerySpec> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn create_session(&self, identifier: &str, secret: &str) -> skyquery::Result<SessionGrant> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.login_failure.lock().unwrap() {
            return Err(failure.to_error());
        }
        if identifier != HANDLE || secret != PASSWORD {
            return Err(QueryError::Authentication(
                "Invalid identifier or password".to_string(),
            ));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(SessionGrant {
            did: DID.to_string(),
            handle: HANDLE.to_string(),
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
        })
    }

    async fn fetch_page(&self, _session: &Session, spec: &QuerySpec) -> skyquery::Result<ResultPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(spec.clone());

        let scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get(&(spec.kind(), spec.target().to_string())) else {
            return Ok(ResultPage::last(vec![]));
        };
        let index = match spec.cursor() {
            None => Some(0),
            Some(cursor) => {
                (1..script.len()).find(|&j| script[j - 1].next() == Some(cursor.as_str()))
            }
        };
        match index.and_then(|i| script.get(i)) {
            Some(Scripted::Page { items, next }) => Ok(ResultPage::new(items.clone(), next.clone())),
            Some(Scripted::Fail(failure)) => Err(failure.to_error()),
            None => Err(QueryError::RemoteService {
                status: 400,
                code: Some("InvalidCursor".to_string()),
                message: None,
            }),
        }
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        *self.rate_limit.lock().unwrap()
    }
}

pub fn post(n: usize) -> ResultItem {
    ResultItem::Post(Post {
        uri: format!("at://{DID}/app.bsky.feed.post/{n}"),
        cid: format!("cid{n}"),
        author: Author {
            did: format!("did:plc:author{}", n % 3),
            handle: format!("author{}.bsky.social", n % 3),
            display_name: None,
        },
        text: format!("post number {n}"),
        created_at: None,
        indexed_at: None,
        reply_count: None,
        repost_count: None,
        like_count: Some(n as u64),
    })
}

pub fn profile(n: usize) -> ResultItem {
    ResultItem::Profile(Profile {
        did: format!("did:plc:user{n}"),
        handle: format!("user{n}.bsky.social"),
        display_name: Some(format!("User {n}")),
        description: None,
        followers_count: None,
        follows_count: None,
        posts_count: None,
    })
}

pub fn posts(range: std::ops::Range<usize>) -> Vec<ResultItem> {
    range.map(post).collect()
}

pub fn profiles(range: std::ops::Range<usize>) -> Vec<ResultItem> {
    range.map(profile).collect()
}

pub fn credentials() -> skyquery::Credentials {
    skyquery::Credentials::new(HANDLE, PASSWORD)
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub sessions: Arc<SessionManager<FakeTransport>>,
    pub queries: QueryFacade<FakeTransport>,
}

impl Harness {
    pub fn new(transport: FakeTransport) -> Self {
        let transport = Arc::new(transport);
        let sessions = Arc::new(SessionManager::with_shared(Arc::clone(&transport)));
        let queries = QueryFacade::new(Arc::clone(&sessions));
        Self {
            transport,
            sessions,
            queries,
        }
    }

    pub async fn logged_in(transport: FakeTransport) -> Self {
        let harness = Self::new(transport);
        harness.sessions.open(&credentials()).await.unwrap();
        harness
    }
}
