//! プロセス内ドキュメントストア
//!
//! JSON スナップショットとして保存・読み込みできる。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Collection, DocumentStore, StoreError, StoreResult};

type Documents = BTreeMap<String, Value>;

/// スナップショットのファイル形式
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    collections: BTreeMap<String, Documents>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<Collection, Documents>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// スナップショットから読み込む。ファイルがなければ空のストア
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("ストアファイルが存在しません。空のストアで開始します: {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        let mut collections = BTreeMap::new();
        for (name, docs) in snapshot.collections {
            match Collection::from_name(&name) {
                Some(collection) => {
                    collections.insert(collection, docs);
                }
                None => debug!(collection = %name, "未知のコレクションを無視します"),
            }
        }

        Ok(Self {
            collections: RwLock::new(collections),
            next_id: AtomicU64::new(snapshot.next_id),
        })
    }

    /// スナップショットとして保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> StoreResult<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            collections: self
                .collections
                .read()
                .iter()
                .map(|(c, docs)| (c.name().to_string(), docs.clone()))
                .collect(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        debug!("ストアを保存しました: {}", path.display());
        Ok(())
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{:08}", n)
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn set(&self, collection: Collection, id: &str, document: Value) -> StoreResult<()> {
        if !document.is_object() {
            return Err(StoreError::NotAnObject {
                collection,
                id: id.to_string(),
            });
        }
        self.collections
            .write()
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    fn merge(&self, collection: Collection, id: &str, patch: Value) -> StoreResult<()> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::NotAnObject {
                collection,
                id: id.to_string(),
            });
        };

        let mut collections = self.collections.write();
        let document = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        let Value::Object(existing) = document else {
            return Err(StoreError::NotAnObject {
                collection,
                id: id.to_string(),
            });
        };
        existing.extend(fields);
        Ok(())
    }

    fn update(
        &self,
        collection: Collection,
        id: &str,
        apply: &mut dyn FnMut(&mut Map<String, Value>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write();
        let document = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        let Value::Object(existing) = document else {
            return Err(StoreError::NotAnObject {
                collection,
                id: id.to_string(),
            });
        };
        // 失敗時に途中の変更を残さないよう複製に適用する
        let mut draft = existing.clone();
        apply(&mut draft)?;
        *existing = draft;
        Ok(())
    }

    fn add(&self, collection: Collection, document: Value) -> StoreResult<String> {
        let id = self.generate_id();
        self.set(collection, &id, document)?;
        Ok(id)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(&collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
