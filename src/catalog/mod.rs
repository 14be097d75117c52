//! 書籍カタログ
//!
//! ユーザー登録、書籍/ブログの投稿、評価とコメント、貸し出し申請を扱う。
//! いずれもドキュメントストアへの読み書きのみで、独自の永続状態は持たない。

pub mod blogs;
pub mod books;
pub mod rentals;
pub mod users;

pub use blogs::{comment_blog, dislike_blog, like_blog, list_blogs, post_blog, BlogDraft, BlogPost};
pub use books::{
    add_comment, dislike_book, get_book, like_book, list_books, paginate, post_book, BookDraft,
    BookListing, Comment,
};
pub use rentals::{notifications_for, request_rental, respond_rental, RentalNotification, RentalStatus};
pub use users::register_user;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::session::SessionContext;
use crate::store::{Collection, DocumentStore, StoreError, StoreResult};

/// 1ページあたりの既定件数
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// 作成日時の文字列（辞書順で時刻順になる）
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 評価の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    fn field(&self) -> &'static str {
        match self {
            Reaction::Like => "likes",
            Reaction::Dislike => "dislikes",
        }
    }
}

/// コレクション内の全ドキュメントを型付きで読み、新しい順に並べる
pub(crate) fn list_newest_first<T, F>(
    store: &dyn DocumentStore,
    collection: Collection,
    created_at: F,
) -> StoreResult<Vec<(String, T)>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> &str,
{
    let mut items = store
        .list(collection)?
        .into_iter()
        .map(|(id, value)| -> StoreResult<(String, T)> { Ok((id, serde_json::from_value(value)?)) })
        .collect::<StoreResult<Vec<_>>>()?;

    items.sort_by(|(a_id, a), (b_id, b)| {
        created_at(b)
            .cmp(created_at(a))
            .then_with(|| b_id.cmp(a_id))
    });
    Ok(items)
}

/// いいね/よくないねのカウンタを1増やし、新しい値を返す
pub(crate) fn react(
    session: &SessionContext,
    collection: Collection,
    id: &str,
    reaction: Reaction,
) -> StoreResult<u64> {
    let field = reaction.field();
    let mut count = 0;
    session.store().update(collection, id, &mut |document| {
        count = document.get(field).and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        document.insert(field.to_string(), json!(count));
        Ok(())
    })?;
    Ok(count)
}

/// コメント配列の末尾に追加する
pub(crate) fn append_comment(
    session: &SessionContext,
    collection: Collection,
    id: &str,
    text: &str,
) -> StoreResult<Comment> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::InvalidState("コメントが空です".to_string()));
    }

    let comment = Comment {
        author_uid: session.uid().to_string(),
        author_name: session.profile().display_name.clone(),
        text: text.to_string(),
        created_at: now_timestamp(),
    };
    let entry = serde_json::to_value(&comment)?;

    session.store().update(collection, id, &mut |document| {
        match document.get_mut("comments") {
            Some(Value::Array(comments)) => comments.push(entry.clone()),
            Some(Value::Null) | None => {
                document.insert("comments".to_string(), Value::Array(vec![entry.clone()]));
            }
            Some(_) => {
                return Err(StoreError::InvalidState(format!(
                    "comments が配列ではありません: {}/{}",
                    collection, id
                )))
            }
        }
        Ok(())
    })?;
    Ok(comment)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::session::SessionContext;
    use crate::store::{DocumentStore, MemoryStore};

    use super::register_user;

    /// 指定ユーザーを登録済みのストアとそれぞれのセッションを作る
    pub fn sessions(uids: &[&str]) -> (Arc<dyn DocumentStore>, Vec<SessionContext>) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let sessions = uids
            .iter()
            .map(|uid| {
                register_user(store.as_ref(), uid, &uid.to_uppercase(), &format!("{}@example.com", uid))
                    .unwrap();
                SessionContext::mount(store.clone(), uid).unwrap()
            })
            .collect();
        (store, sessions)
    }
}
