//! Typed Bluesky client: one session per [`SessionManager`], and query
//! operations on [`QueryFacade`] that follow server cursors lazily.
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::TryStreamExt;
//! use skyquery::{Config, Credentials, QueryFacade, SessionManager, XrpcTransport};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let transport = XrpcTransport::from_config(&config)?;
//! let sessions = Arc::new(
//!     SessionManager::new(transport).with_handle_domain(config.handle_domain.clone()),
//! );
//! sessions.open(&Credentials::new("alice", "app-password")).await?;
//!
//! let queries = QueryFacade::with_options(sessions, config.paging_options())?;
//! let posts: Vec<_> = queries.search_posts("rust").await?.try_collect().await?;
//! println!("{} posts", posts.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod rate_limit;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, QueryError, Result};
pub use models::{
    AccountId, Author, Credentials, Cursor, Post, Profile, QueryKind, QuerySpec, ResultItem,
    ResultPage, Session, SessionGrant,
};
pub use query::{PagingOptions, QueryFacade, ResultStream};
pub use rate_limit::RateLimit;
pub use session::SessionManager;
pub use transport::{Transport, XrpcTransport};
