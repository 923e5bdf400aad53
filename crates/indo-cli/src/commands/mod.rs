pub mod common;
pub mod completions;
pub mod queue;
pub mod sync;
pub mod task;
pub mod timer;
pub mod watch;
