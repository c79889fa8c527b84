//! StateStore port - キュードキュメントの永続化
//!
//! StateStore は key ごとに JSON ドキュメントを get/set するだけの薄い I/O 境界です。
//!
//! # 設計原則
//! - 検証・リトライ・ロックはここに置かない（エンジン側の責務）
//! - 壊れたドキュメントの扱いもエンジンが決める（デフォルト状態で置き換える）

use async_trait::async_trait;

use crate::error::StoreError;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Raw document for `key`, or `None` when nothing has been written yet.
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Replace the document for `key`.
    async fn write(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError>;
}
