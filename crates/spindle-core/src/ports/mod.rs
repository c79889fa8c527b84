//! Ports - 抽象化レイヤー
//!
//! Engine が外部に依存する箇所はすべて trait として定義します。
//! - StateStore: ドキュメントの get/set（JSON ファイル / InMemory）
//! - TaskExecutor / CommentHook: 実行系
//! - Clock / IdGenerator: テスト容易性のため

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod state_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{CommentHook, TaskExecutor};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::state_store::StateStore;
