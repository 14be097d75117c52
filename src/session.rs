//! ログイン中ユーザーのセッション
//!
//! 画面をまたいで共有するグローバル状態は持たず、マウント時にプロフィールを
//! 一度取得して各操作へ明示的に渡す。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{get_typed, Collection, DocumentStore, StoreResult};

/// `users/{uid}` に保存されるプロフィール
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub created_at: String,
}

/// 操作を行うユーザーの文脈
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn DocumentStore>,
    profile: UserProfile,
}

impl SessionContext {
    /// プロフィールを取得してセッションを開始する
    pub fn mount(store: Arc<dyn DocumentStore>, uid: &str) -> StoreResult<Self> {
        let profile: UserProfile = get_typed(store.as_ref(), Collection::Users, uid)?;
        debug!(uid, name = %profile.display_name, "セッション開始");
        Ok(Self { store, profile })
    }

    /// プロフィールを再取得する
    pub fn refresh(&mut self) -> StoreResult<()> {
        self.profile = get_typed(self.store.as_ref(), Collection::Users, &self.profile.uid)?;
        Ok(())
    }

    pub fn uid(&self) -> &str {
        &self.profile.uid
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use serde_json::json;

    fn store_with_user() -> Arc<dyn DocumentStore> {
        let store = MemoryStore::new();
        store
            .set(
                Collection::Users,
                "u1",
                json!({"uid": "u1", "display_name": "Aki", "email": "aki@example.com"}),
            )
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_mount_fetches_profile() {
        let session = SessionContext::mount(store_with_user(), "u1").unwrap();
        assert_eq!(session.uid(), "u1");
        assert_eq!(session.profile().display_name, "Aki");
    }

    #[test]
    fn test_mount_missing_user() {
        let result = SessionContext::mount(store_with_user(), "ghost");
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_refresh_sees_updates() {
        let store = store_with_user();
        let mut session = SessionContext::mount(store.clone(), "u1").unwrap();
        store
            .merge(Collection::Users, "u1", json!({"display_name": "Akira"}))
            .unwrap();

        assert_eq!(session.profile().display_name, "Aki");
        session.refresh().unwrap();
        assert_eq!(session.profile().display_name, "Akira");
    }
}
