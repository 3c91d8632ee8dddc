//! Query operations over an authenticated session.
//!
//! Every operation validates its input, fetches the first page eagerly (so a
//! broken request fails at the call site) and returns a lazy stream that
//! follows server-issued cursors until the service stops handing them out.

use crate::error::{QueryError, Result};
use crate::models::{
    AccountId, Cursor, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, QueryKind, QuerySpec, ResultItem,
    Session,
};
use crate::session::SessionManager;
use crate::transport::Transport;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Lazy, finite, single-use sequence of results.
pub type ResultStream = BoxStream<'static, Result<ResultItem>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingOptions {
    /// Items requested per page (1..=100).
    pub page_limit: u8,
    /// Pause between consecutive page requests of one stream.
    pub page_delay: Option<Duration>,
    /// Wait for the rate-limit window to reset once `remaining` drops to this.
    pub rate_limit_tolerance: Option<u32>,
    /// Domain appended to bare account names.
    pub handle_domain: Option<String>,
}

impl Default for PagingOptions {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            page_delay: None,
            rate_limit_tolerance: None,
            handle_domain: None,
        }
    }
}

pub struct QueryFacade<T> {
    sessions: Arc<SessionManager<T>>,
    options: PagingOptions,
}

impl<T> Clone for QueryFacade<T> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            options: self.options.clone(),
        }
    }
}

impl<T: Transport> QueryFacade<T> {
    pub fn new(sessions: Arc<SessionManager<T>>) -> Self {
        Self {
            sessions,
            options: PagingOptions::default(),
        }
    }

    pub fn with_options(sessions: Arc<SessionManager<T>>, options: PagingOptions) -> Result<Self> {
        if options.page_limit == 0 || options.page_limit > MAX_PAGE_LIMIT {
            return Err(QueryError::InvalidArgument(format!(
                "page_limit must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                options.page_limit
            )));
        }
        Ok(Self { sessions, options })
    }

    pub const fn sessions(&self) -> &Arc<SessionManager<T>> {
        &self.sessions
    }

    pub const fn options(&self) -> &PagingOptions {
        &self.options
    }

    pub async fn search_posts(&self, query: &str) -> Result<ResultStream> {
        self.run(QueryKind::SearchPosts, query).await
    }

    pub async fn get_timeline(&self, account: &str) -> Result<ResultStream> {
        self.run(QueryKind::Timeline, account).await
    }

    pub async fn get_followers(&self, account: &str) -> Result<ResultStream> {
        self.run(QueryKind::Followers, account).await
    }

    pub async fn get_follows(&self, account: &str) -> Result<ResultStream> {
        self.run(QueryKind::Follows, account).await
    }

    pub async fn search_users(&self, query: &str) -> Result<ResultStream> {
        self.run(QueryKind::SearchUsers, query).await
    }

    /// Distinct handles of everyone whose posts match `query`, in the order
    /// they first appear.
    pub async fn users_discussing(&self, query: &str) -> Result<Vec<String>> {
        let posts = self.search_posts(query).await?;
        let mut seen = HashSet::new();
        posts
            .try_filter_map(|item| {
                let handle = match item {
                    ResultItem::Post(post) => Some(post.author.handle),
                    ResultItem::Profile(_) => None,
                };
                futures::future::ready(Ok(handle))
            })
            .try_filter(move |handle| futures::future::ready(seen.insert(handle.clone())))
            .try_collect()
            .await
    }

    async fn run(&self, kind: QueryKind, raw_target: &str) -> Result<ResultStream> {
        let session = self.sessions.current()?;
        let target = self.normalize_target(kind, raw_target)?;
        let spec = QuerySpec::new(kind, target).with_limit(self.options.page_limit);

        let mut pager = Pager {
            sessions: Arc::clone(&self.sessions),
            session,
            spec,
            options: self.options.clone(),
            cursor: None,
            buffered: VecDeque::new(),
            pages: 0,
            finished: false,
        };
        pager.fetch_next().await?;

        Ok(stream::unfold(pager, |mut pager| async move {
            pager.next_item().await.map(|item| (item, pager))
        })
        .boxed())
    }

    fn normalize_target(&self, kind: QueryKind, raw: &str) -> Result<String> {
        if kind.takes_account() {
            let account = AccountId::parse(raw, self.options.handle_domain.as_deref())?;
            return Ok(account.as_str().to_string());
        }
        let query = raw.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "{kind} query must not be empty"
            )));
        }
        Ok(query.to_string())
    }
}

/// Cursor-following state behind one [`ResultStream`].
struct Pager<T> {
    sessions: Arc<SessionManager<T>>,
    session: Session,
    spec: QuerySpec,
    options: PagingOptions,
    cursor: Option<Cursor>,
    buffered: VecDeque<ResultItem>,
    pages: u32,
    finished: bool,
}

impl<T: Transport> Pager<T> {
    async fn next_item(&mut self) -> Option<Result<ResultItem>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fetch_next().await {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }

    async fn fetch_next(&mut self) -> Result<()> {
        if !self.session.is_valid() {
            return Err(QueryError::NotAuthenticated);
        }
        if self.pages > 0
            && let Some(delay) = self.options.page_delay
        {
            tokio::time::sleep(delay).await;
        }
        self.respect_rate_limit().await;
        // The session may have been closed or replaced while we slept.
        if !self.session.is_valid() {
            return Err(QueryError::NotAuthenticated);
        }

        let spec = self.spec.with_cursor(self.cursor.clone());
        let transport = self.sessions.transport();
        let page = match transport.fetch_page(&self.session, &spec).await {
            Ok(page) => page,
            Err(e) => {
                if e.invalidates_session() {
                    self.sessions.invalidate(&self.session);
                }
                return Err(e);
            }
        };
        self.pages += 1;

        tracing::debug!(
            kind = %spec.kind(),
            page = self.pages,
            items = page.items.len(),
            has_next = page.next_cursor.is_some(),
            "Fetched page"
        );

        self.buffered.extend(page.items);
        match page.next_cursor {
            Some(next) if self.cursor.as_ref() == Some(&next) => {
                tracing::warn!(
                    kind = %spec.kind(),
                    cursor = next.as_str(),
                    "Service returned the cursor it was given, stopping"
                );
                self.finished = true;
            }
            Some(next) => self.cursor = Some(next),
            None => self.finished = true,
        }
        Ok(())
    }

    async fn respect_rate_limit(&self) {
        let Some(tolerance) = self.options.rate_limit_tolerance else {
            return;
        };
        let Some(rl) = self.sessions.transport().rate_limit() else {
            return;
        };
        if !rl.is_near_exhaustion(tolerance) {
            return;
        }
        let wait = rl.wait_time(Utc::now());
        if wait > Duration::ZERO {
            tracing::warn!(
                remaining = rl.remaining,
                wait_secs = wait.as_secs(),
                "Rate limit nearly exhausted, waiting for reset"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
