//! 核心编排层：错误分类、缓存、重试、状态投影、请求编排器与会话运行时

pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use cache::ExplanationCache;
pub use error::{ErrorKind, ExplainError};
pub use orchestrator::{ExplainJob, ListJob, RequestOrchestrator, RequestToken};
pub use retry::{run_with_retry, RetryPolicy, RetryScheduler};
pub use session::{spawn_session, Command, ExplainSession, SessionOptions};
pub use session_supervisor::SessionSupervisor;
pub use state::{RequestState, SubjectListState, UiState};
