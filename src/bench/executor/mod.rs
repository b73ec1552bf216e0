pub mod plan;
pub mod retry;
pub mod task_executor;

pub use plan::resolve_plan;
pub use retry::{RetryPolicy, RetryStrategy};
pub use task_executor::TaskExecutor;
