//! ブログ投稿

use serde::{Deserialize, Serialize};
use tracing::info;

use super::books::Comment;
use super::{append_comment, list_newest_first, now_timestamp, react, Reaction};
use crate::session::SessionContext;
use crate::store::{Collection, DocumentStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author_uid: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct BlogDraft {
    pub title: String,
    pub body: String,
}

pub fn post_blog(session: &SessionContext, draft: BlogDraft) -> StoreResult<BlogPost> {
    if draft.title.trim().is_empty() {
        return Err(StoreError::InvalidState("タイトルが空です".to_string()));
    }

    let mut post = BlogPost {
        id: String::new(),
        title: draft.title.trim().to_string(),
        body: draft.body,
        author_uid: session.uid().to_string(),
        author_name: session.profile().display_name.clone(),
        likes: 0,
        dislikes: 0,
        comments: Vec::new(),
        created_at: now_timestamp(),
    };
    post.id = session
        .store()
        .add(Collection::Blogs, serde_json::to_value(&post)?)?;
    info!(id = %post.id, author = %post.author_uid, "ブログを投稿しました");
    Ok(post)
}

pub fn list_blogs(store: &dyn DocumentStore) -> StoreResult<Vec<BlogPost>> {
    Ok(
        list_newest_first(store, Collection::Blogs, |p: &BlogPost| p.created_at.as_str())?
            .into_iter()
            .map(|(id, mut post)| {
                post.id = id;
                post
            })
            .collect(),
    )
}

pub fn like_blog(session: &SessionContext, id: &str) -> StoreResult<u64> {
    react(session, Collection::Blogs, id, Reaction::Like)
}

pub fn dislike_blog(session: &SessionContext, id: &str) -> StoreResult<u64> {
    react(session, Collection::Blogs, id, Reaction::Dislike)
}

pub fn comment_blog(session: &SessionContext, id: &str, text: &str) -> StoreResult<Comment> {
    append_comment(session, Collection::Blogs, id, text)
}
