//! 書籍の投稿・一覧・評価・コメント

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{append_comment, list_newest_first, now_timestamp, react, Reaction};
use crate::recognition::Decision;
use crate::session::SessionContext;
use crate::store::{get_typed, Collection, DocumentStore, StoreError, StoreResult};

/// 書籍・ブログに付くコメント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author_uid: String,
    #[serde(default)]
    pub author_name: String,
    pub text: String,
    pub created_at: String,
}

fn default_available() -> bool {
    true
}

/// `books/{id}` の内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookListing {
    /// ドキュメント ID（本文には保存しない）
    #[serde(skip)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_uid: String,
    #[serde(default)]
    pub owner_name: String,
    /// 認識で得たカテゴリ
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub recognized_confidence: Option<f32>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: String,
}

/// 投稿フォームの入力
#[derive(Debug, Clone, Default)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub recognized_confidence: Option<f32>,
}

impl BookDraft {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    /// 認識結果をカテゴリとして反映する。判定不能の場合は何もしない
    pub fn apply_recognition(&mut self, decision: &Decision) {
        if let Some(label) = decision.label() {
            self.category = Some(label.to_string());
            self.recognized_confidence = Some(decision.confidence());
        }
    }
}

/// ログイン中ユーザーを所有者として書籍を投稿する
pub fn post_book(session: &SessionContext, draft: BookDraft) -> StoreResult<BookListing> {
    if draft.title.trim().is_empty() {
        return Err(StoreError::InvalidState("タイトルが空です".to_string()));
    }

    let mut listing = BookListing {
        id: String::new(),
        title: draft.title.trim().to_string(),
        author: draft.author.trim().to_string(),
        description: draft.description,
        owner_uid: session.uid().to_string(),
        owner_name: session.profile().display_name.clone(),
        category: draft.category,
        recognized_confidence: draft.recognized_confidence,
        available: true,
        likes: 0,
        dislikes: 0,
        comments: Vec::new(),
        created_at: now_timestamp(),
    };

    listing.id = session
        .store()
        .add(Collection::Books, serde_json::to_value(&listing)?)?;
    info!(id = %listing.id, title = %listing.title, owner = %listing.owner_uid, "書籍を投稿しました");
    Ok(listing)
}

/// 書籍を1件取得
pub fn get_book(store: &dyn DocumentStore, id: &str) -> StoreResult<BookListing> {
    let mut listing: BookListing = get_typed(store, Collection::Books, id)?;
    listing.id = id.to_string();
    Ok(listing)
}

/// 全書籍を新しい順に取得
pub fn list_books(store: &dyn DocumentStore) -> StoreResult<Vec<BookListing>> {
    Ok(
        list_newest_first(store, Collection::Books, |b: &BookListing| b.created_at.as_str())?
            .into_iter()
            .map(|(id, mut listing)| {
                listing.id = id;
                listing
            })
            .collect(),
    )
}

/// 一覧をページ単位で切り出す
///
/// ページ番号は1から。範囲外のページは空。
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    if page == 0 || page_size == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

pub fn like_book(session: &SessionContext, id: &str) -> StoreResult<u64> {
    react(session, Collection::Books, id, Reaction::Like)
}

pub fn dislike_book(session: &SessionContext, id: &str) -> StoreResult<u64> {
    react(session, Collection::Books, id, Reaction::Dislike)
}

pub fn add_comment(session: &SessionContext, id: &str, text: &str) -> StoreResult<Comment> {
    append_comment(session, Collection::Books, id, text)
}
