mod message;
mod thread;
mod tool;

pub use message::{Message, Role, StoredMessage};
pub use thread::{Thread, ThreadSummary, DEFAULT_THREAD_TITLE};
pub use tool::{FunctionCall, ToolCall};
