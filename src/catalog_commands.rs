//! カタログ操作のコマンド
//!
//! ストアを操作し、結果を標準出力へ表示する。

use anyhow::{Context, Result};

use crate::catalog::{self, BlogDraft, BlogPost, BookDraft, BookListing, RentalNotification};
use crate::recognition::Decision;
use crate::AppState;

fn print_book(book: &BookListing) {
    let category = book.category.as_deref().unwrap_or("-");
    let status = if book.available { "貸出可" } else { "貸出中" };
    println!(
        "[{}] {} / {}  カテゴリ: {}  {}  👍{} 👎{}  💬{}  (所有者: {})",
        book.id,
        book.title,
        if book.author.is_empty() { "-" } else { book.author.as_str() },
        category,
        status,
        book.likes,
        book.dislikes,
        book.comments.len(),
        book.owner_uid
    );
}

fn print_blog(post: &BlogPost) {
    println!(
        "[{}] {}  (著者: {})  👍{} 👎{}  💬{}",
        post.id,
        post.title,
        post.author_uid,
        post.likes,
        post.dislikes,
        post.comments.len()
    );
}

fn print_notification(n: &RentalNotification) {
    println!(
        "[{}] {}  書籍: {} ({})  申請者: {} → 所有者: {}  {}",
        n.id,
        n.status,
        n.book_title,
        n.book_id,
        n.requester_uid,
        n.owner_uid,
        n.message.as_deref().unwrap_or("")
    );
}

pub fn register_user(state: &AppState, uid: &str, name: &str, email: &str) -> Result<()> {
    let store = state.store();
    let profile = catalog::register_user(store.as_ref(), uid, name, email)?;
    state.persist()?;
    println!("✓ ユーザーを登録しました: {} ({})", profile.display_name, profile.uid);
    Ok(())
}

/// 書籍を投稿する。認識結果があればカテゴリに反映する
pub fn post_book(
    state: &AppState,
    uid: &str,
    mut draft: BookDraft,
    recognition: Option<&Decision>,
) -> Result<BookListing> {
    let session = state.session(uid)?;
    if let Some(decision) = recognition {
        println!("認識結果: {}", decision);
        draft.apply_recognition(decision);
    }
    let book = catalog::post_book(&session, draft)?;
    state.persist()?;
    println!("✓ 書籍を投稿しました");
    print_book(&book);
    Ok(book)
}

pub fn list_books(state: &AppState, page: usize, page_size: usize) -> Result<()> {
    let books = catalog::list_books(state.store().as_ref())?;
    let items = catalog::paginate(&books, page, page_size);
    println!("=== 書籍一覧 (ページ {} / 全{}件) ===", page, books.len());
    if items.is_empty() {
        println!("(該当なし)");
    }
    for book in items {
        print_book(book);
    }
    Ok(())
}

pub fn like_book(state: &AppState, uid: &str, id: &str, like: bool) -> Result<()> {
    let session = state.session(uid)?;
    let count = if like {
        catalog::like_book(&session, id)?
    } else {
        catalog::dislike_book(&session, id)?
    };
    state.persist()?;
    println!("✓ {}: {}", if like { "いいね" } else { "よくないね" }, count);
    Ok(())
}

pub fn comment_book(state: &AppState, uid: &str, id: &str, text: &str) -> Result<()> {
    let session = state.session(uid)?;
    catalog::add_comment(&session, id, text)?;
    state.persist()?;
    println!("✓ コメントを追加しました");
    Ok(())
}

pub fn post_blog(state: &AppState, uid: &str, draft: BlogDraft) -> Result<()> {
    let session = state.session(uid)?;
    let post = catalog::post_blog(&session, draft)?;
    state.persist()?;
    println!("✓ ブログを投稿しました");
    print_blog(&post);
    Ok(())
}

pub fn list_blogs(state: &AppState, page: usize, page_size: usize) -> Result<()> {
    let posts = catalog::list_blogs(state.store().as_ref())?;
    println!("=== ブログ一覧 (ページ {} / 全{}件) ===", page, posts.len());
    for post in catalog::paginate(&posts, page, page_size) {
        print_blog(post);
    }
    Ok(())
}

pub fn like_blog(state: &AppState, uid: &str, id: &str, like: bool) -> Result<()> {
    let session = state.session(uid)?;
    let count = if like {
        catalog::like_blog(&session, id)?
    } else {
        catalog::dislike_blog(&session, id)?
    };
    state.persist()?;
    println!("✓ {}: {}", if like { "いいね" } else { "よくないね" }, count);
    Ok(())
}

pub fn comment_blog(state: &AppState, uid: &str, id: &str, text: &str) -> Result<()> {
    let session = state.session(uid)?;
    catalog::comment_blog(&session, id, text)?;
    state.persist()?;
    println!("✓ コメントを追加しました");
    Ok(())
}

pub fn request_rental(state: &AppState, uid: &str, book_id: &str, message: Option<String>) -> Result<()> {
    let session = state.session(uid)?;
    let notification = catalog::request_rental(&session, book_id, message)
        .with_context(|| format!("貸し出し申請に失敗しました: {}", book_id))?;
    state.persist()?;
    println!("✓ 貸し出しを申請しました");
    print_notification(&notification);
    Ok(())
}

pub fn respond_rental(state: &AppState, uid: &str, notification_id: &str, approve: bool) -> Result<()> {
    let session = state.session(uid)?;
    let notification = catalog::respond_rental(&session, notification_id, approve)
        .with_context(|| format!("申請への応答に失敗しました: {}", notification_id))?;
    state.persist()?;
    println!("✓ 申請に応答しました");
    print_notification(&notification);
    Ok(())
}

pub fn list_notifications(state: &AppState, uid: &str) -> Result<()> {
    // 通知一覧はログイン中のユーザーのものに限る
    let session = state.session(uid)?;
    let notifications = catalog::notifications_for(session.store(), session.uid())?;
    println!("=== {} の通知 ({}件) ===", session.profile().display_name, notifications.len());
    for n in &notifications {
        print_notification(n);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;

    #[test]
    fn test_commands_persist_to_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let store_path = dir.path().join("store.json");

        let state = AppState::open(&config_path, Some(store_path.clone())).unwrap();
        register_user(&state, "owner", "Owner", "owner@example.com").unwrap();
        register_user(&state, "reader", "Reader", "reader@example.com").unwrap();
        let book = post_book(&state, "owner", BookDraft::new("Dune", "Herbert"), None).unwrap();
        request_rental(&state, "reader", &book.id, None).unwrap();

        let reopened = AppState::open(&config_path, Some(store_path)).unwrap();
        let store = reopened.store();
        assert_eq!(store.list(Collection::Users).unwrap().len(), 2);
        assert_eq!(store.list(Collection::Notifications).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_user_cannot_post() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(&dir.path().join("c.json"), Some(dir.path().join("s.json"))).unwrap();
        assert!(post_book(&state, "ghost", BookDraft::new("Dune", ""), None).is_err());
    }
}
