//! 貸し出し申請と承認/却下
//!
//! 申請は所有者宛ての通知ドキュメントとして `notifications` に書き込む。
//! 状態は `pending → approved | declined` の一方向のみ。

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::books::get_book;
use super::{list_newest_first, now_timestamp};
use crate::session::SessionContext;
use crate::store::{get_typed, Collection, DocumentStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Pending,
    Approved,
    Declined,
}

impl std::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RentalStatus::Pending => write!(f, "申請中"),
            RentalStatus::Approved => write!(f, "承認"),
            RentalStatus::Declined => write!(f, "却下"),
        }
    }
}

/// `notifications/{id}` の内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalNotification {
    #[serde(skip)]
    pub id: String,
    pub book_id: String,
    #[serde(default)]
    pub book_title: String,
    /// 申請者
    pub requester_uid: String,
    #[serde(default)]
    pub requester_name: String,
    /// 宛先（書籍の所有者）
    pub owner_uid: String,
    pub status: RentalStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub responded_at: Option<String>,
}

/// 書籍の貸し出しを申請する
pub fn request_rental(
    session: &SessionContext,
    book_id: &str,
    message: Option<String>,
) -> StoreResult<RentalNotification> {
    let store = session.store();
    let book = get_book(store, book_id)?;

    if book.owner_uid == session.uid() {
        return Err(StoreError::Forbidden(
            "自分の書籍には申請できません".to_string(),
        ));
    }
    if !book.available {
        return Err(StoreError::InvalidState(format!(
            "貸し出し中の書籍です: {}",
            book.title
        )));
    }

    let mut notification = RentalNotification {
        id: String::new(),
        book_id: book_id.to_string(),
        book_title: book.title,
        requester_uid: session.uid().to_string(),
        requester_name: session.profile().display_name.clone(),
        owner_uid: book.owner_uid,
        status: RentalStatus::Pending,
        message,
        created_at: now_timestamp(),
        responded_at: None,
    };
    notification.id = store.add(Collection::Notifications, serde_json::to_value(&notification)?)?;

    info!(
        id = %notification.id,
        book = %notification.book_id,
        requester = %notification.requester_uid,
        owner = %notification.owner_uid,
        "貸し出し申請を作成しました"
    );
    Ok(notification)
}

/// 申請を承認または却下する
///
/// 所有者のみ、`pending` の申請に対してのみ可能。承認すると書籍は貸し出し不可になり、
/// 既に貸し出し中の書籍への申請は承認できない。
pub fn respond_rental(
    session: &SessionContext,
    notification_id: &str,
    approve: bool,
) -> StoreResult<RentalNotification> {
    let store = session.store();
    let mut notification: RentalNotification =
        get_typed(store, Collection::Notifications, notification_id)?;
    notification.id = notification_id.to_string();

    if notification.owner_uid != session.uid() {
        warn!(
            id = notification_id,
            uid = session.uid(),
            "所有者以外による応答を拒否しました"
        );
        return Err(StoreError::Forbidden(
            "書籍の所有者のみ応答できます".to_string(),
        ));
    }
    ensure_pending(notification.status)?;

    let status = if approve {
        RentalStatus::Approved
    } else {
        RentalStatus::Declined
    };
    let responded_at = now_timestamp();

    if approve {
        lend_book(store, &notification)?;
    }
    let answered = store.update(Collection::Notifications, notification_id, &mut |document| {
        let current = document.get("status").cloned().unwrap_or_default();
        ensure_pending(serde_json::from_value(current)?)?;
        document.insert("status".to_string(), json!(status));
        document.insert("responded_at".to_string(), json!(responded_at));
        Ok(())
    });
    if let Err(e) = answered {
        if approve {
            return_book(store, &notification.book_id)?;
        }
        return Err(e);
    }

    notification.status = status;
    notification.responded_at = Some(responded_at);
    info!(id = notification_id, status = %status, "貸し出し申請に応答しました");
    Ok(notification)
}

fn ensure_pending(status: RentalStatus) -> StoreResult<()> {
    if status != RentalStatus::Pending {
        return Err(StoreError::InvalidState(format!(
            "この申請は既に{}されています",
            status
        )));
    }
    Ok(())
}

/// 貸し出し可能な書籍を申請者に貸し出す
fn lend_book(store: &dyn DocumentStore, notification: &RentalNotification) -> StoreResult<()> {
    store.update(Collection::Books, &notification.book_id, &mut |book| {
        let available = book.get("available").and_then(|v| v.as_bool()).unwrap_or(true);
        if !available {
            let borrower = book.get("borrower_uid").and_then(|v| v.as_str()).unwrap_or("-");
            warn!(book = %notification.book_id, borrower, "貸し出し中の書籍への承認を拒否しました");
            return Err(StoreError::InvalidState(format!(
                "既に貸し出し中の書籍です: {}",
                notification.book_title
            )));
        }
        book.insert("available".to_string(), json!(false));
        book.insert("borrower_uid".to_string(), json!(notification.requester_uid));
        Ok(())
    })
}

fn return_book(store: &dyn DocumentStore, book_id: &str) -> StoreResult<()> {
    store.update(Collection::Books, book_id, &mut |book| {
        book.insert("available".to_string(), json!(true));
        book.remove("borrower_uid");
        Ok(())
    })
}

/// ユーザーが申請者または宛先である通知を新しい順に取得
pub fn notifications_for(store: &dyn DocumentStore, uid: &str) -> StoreResult<Vec<RentalNotification>> {
    Ok(list_newest_first(
        store,
        Collection::Notifications,
        |n: &RentalNotification| n.created_at.as_str(),
    )?
    .into_iter()
    .filter(|(_, n)| n.owner_uid == uid || n.requester_uid == uid)
    .map(|(id, mut n)| {
        n.id = id;
        n
    })
    .collect())
}
