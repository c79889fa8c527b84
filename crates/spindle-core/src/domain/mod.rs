//! Domain model (ids, tasks, comments, the persisted queue document).

pub mod comment;
pub mod document;
pub mod ids;
pub mod state;
pub mod task;

pub use comment::Comment;
pub use document::{DEFAULT_PRIORITY_ORDER, GlobalConfig, Metadata, PriorityQueue, QueueState};
pub use ids::TaskId;
pub use state::{TaskKind, TaskStatus};
pub use task::{NewTask, Runnable, Task};
