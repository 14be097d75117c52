//! ユーザー登録

use tracing::info;

use super::now_timestamp;
use crate::session::UserProfile;
use crate::store::{Collection, DocumentStore, StoreError, StoreResult};

/// `users/{uid}` にプロフィールを作成する
///
/// 認証は外部サービスの責務で、ここでは UID を受け取るだけ。
pub fn register_user(
    store: &dyn DocumentStore,
    uid: &str,
    display_name: &str,
    email: &str,
) -> StoreResult<UserProfile> {
    if uid.trim().is_empty() {
        return Err(StoreError::InvalidState("UID が空です".to_string()));
    }
    if store.get(Collection::Users, uid)?.is_some() {
        return Err(StoreError::InvalidState(format!(
            "ユーザーは既に登録されています: {}",
            uid
        )));
    }

    let profile = UserProfile {
        uid: uid.to_string(),
        display_name: display_name.to_string(),
        email: email.to_string(),
        created_at: now_timestamp(),
    };
    store.set(Collection::Users, uid, serde_json::to_value(&profile)?)?;
    info!(uid, "ユーザーを登録しました");
    Ok(profile)
}
