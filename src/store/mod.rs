//! ドキュメントストア
//!
//! 外部ドキュメントDBと同じ「コレクション/ドキュメント」の契約を持つ抽象。
//! ドキュメントは不透明な JSON として扱い、更新はフィールド単位でマージする。

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// コレクション名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Books,
    Blogs,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Books,
        Collection::Blogs,
        Collection::Notifications,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Books => "books",
            Collection::Blogs => "blogs",
            Collection::Notifications => "notifications",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ドキュメントが見つかりません: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("操作が許可されていません: {0}")]
    Forbidden(String),

    #[error("状態が不正です: {0}")]
    InvalidState(String),

    #[error("ドキュメントはオブジェクトである必要があります: {collection}/{id}")]
    NotAnObject { collection: Collection, id: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// コレクション/ドキュメント形式のストア
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>>;

    /// ドキュメントを丸ごと書き込む
    fn set(&self, collection: Collection, id: &str, document: Value) -> StoreResult<()>;

    /// 既存ドキュメントにフィールドをマージする（存在しない場合は NotFound）
    fn merge(&self, collection: Collection, id: &str, patch: Value) -> StoreResult<()>;

    /// 既存ドキュメントを読み込んだまま書き換える
    ///
    /// 読み込みから書き戻しまで他の書き込みは割り込まない。`apply` が
    /// エラーを返した場合ドキュメントは変更されない。
    fn update(
        &self,
        collection: Collection,
        id: &str,
        apply: &mut dyn FnMut(&mut Map<String, Value>) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// 新しい ID で追加し、その ID を返す
    fn add(&self, collection: Collection, document: Value) -> StoreResult<String>;

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<bool>;

    /// コレクション内の全ドキュメント（ID 順）
    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>>;
}

/// 型付きで読み込む
pub fn get_typed<T: serde::de::DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    id: &str,
) -> StoreResult<T> {
    let value = store
        .get(collection, id)?
        .ok_or_else(|| StoreError::NotFound {
            collection,
            id: id.to_string(),
        })?;
    Ok(serde_json::from_value(value)?)
}
