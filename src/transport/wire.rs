//! JSON shapes of the XRPC responses consumed by the client, and their
//! conversion into [`ResultPage`]s.

use crate::error::{QueryError, Result};
use crate::models::{Author, Post, Profile, QueryKind, ResultItem, ResultPage};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    did: String,
    handle: String,
    display_name: Option<String>,
    description: Option<String>,
    followers_count: Option<u64>,
    follows_count: Option<u64>,
    posts_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(default)]
    text: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    cid: String,
    author: ProfileView,
    record: PostRecord,
    indexed_at: Option<String>,
    reply_count: Option<u64>,
    repost_count: Option<u64>,
    like_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
}

#[derive(Debug, Deserialize)]
struct SearchPostsOutput {
    cursor: Option<String>,
    #[serde(default)]
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct AuthorFeedOutput {
    cursor: Option<String>,
    #[serde(default)]
    feed: Vec<FeedViewPost>,
}

#[derive(Debug, Deserialize)]
struct FollowersOutput {
    cursor: Option<String>,
    #[serde(default)]
    followers: Vec<ProfileView>,
}

#[derive(Debug, Deserialize)]
struct FollowsOutput {
    cursor: Option<String>,
    #[serde(default)]
    follows: Vec<ProfileView>,
}

#[derive(Debug, Deserialize)]
struct SearchActorsOutput {
    cursor: Option<String>,
    #[serde(default)]
    actors: Vec<ProfileView>,
}

impl From<ProfileView> for Profile {
    fn from(view: ProfileView) -> Self {
        Self {
            did: view.did,
            handle: view.handle,
            display_name: view.display_name.filter(|n| !n.is_empty()),
            description: view.description,
            followers_count: view.followers_count,
            follows_count: view.follows_count,
            posts_count: view.posts_count,
        }
    }
}

impl From<PostView> for Post {
    fn from(view: PostView) -> Self {
        Self {
            uri: view.uri,
            cid: view.cid,
            author: Author {
                did: view.author.did,
                handle: view.author.handle,
                display_name: view.author.display_name.filter(|n| !n.is_empty()),
            },
            text: view.record.text,
            created_at: view.record.created_at.as_deref().and_then(parse_timestamp),
            indexed_at: view.indexed_at.as_deref().and_then(parse_timestamp),
            reply_count: view.reply_count,
            repost_count: view.repost_count,
            like_count: view.like_count,
        }
    }
}

/// Timestamps are RFC 3339; anything else is dropped rather than failing the page.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn posts(views: Vec<PostView>) -> Vec<ResultItem> {
    views.into_iter().map(|v| ResultItem::Post(v.into())).collect()
}

fn profiles(views: Vec<ProfileView>) -> Vec<ResultItem> {
    views
        .into_iter()
        .map(|v| ResultItem::Profile(v.into()))
        .collect()
}

/// Decodes a successful response body for `kind`.
pub fn decode_page(kind: QueryKind, body: &[u8]) -> Result<ResultPage> {
    let invalid = |e: serde_json::Error| {
        QueryError::InvalidResponse(format!("cannot decode {kind} page: {e}"))
    };
    let page = match kind {
        QueryKind::SearchPosts => {
            let out: SearchPostsOutput = serde_json::from_slice(body).map_err(invalid)?;
            ResultPage::new(posts(out.posts), out.cursor)
        }
        QueryKind::Timeline => {
            let out: AuthorFeedOutput = serde_json::from_slice(body).map_err(invalid)?;
            let items = posts(out.feed.into_iter().map(|f| f.post).collect());
            ResultPage::new(items, out.cursor)
        }
        QueryKind::Followers => {
            let out: FollowersOutput = serde_json::from_slice(body).map_err(invalid)?;
            ResultPage::new(profiles(out.followers), out.cursor)
        }
        QueryKind::Follows => {
            let out: FollowsOutput = serde_json::from_slice(body).map_err(invalid)?;
            ResultPage::new(profiles(out.follows), out.cursor)
        }
        QueryKind::SearchUsers => {
            let out: SearchActorsOutput = serde_json::from_slice(body).map_err(invalid)?;
            ResultPage::new(profiles(out.actors), out.cursor)
        }
    };
    Ok(page)
}
