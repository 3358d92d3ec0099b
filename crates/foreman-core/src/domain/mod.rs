//! Domain model: ids, the task row, its state machine, execution outcomes,
//! and terminal events.

pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use events::{EventSink, LogEventSink, MemoryEventSink, TaskEvent};
pub use ids::{ClusterName, TaskId, WorkerId};
pub use outcome::ExecutionOutcome;
pub use state::TaskState;
pub use task::{NewTask, Task};
