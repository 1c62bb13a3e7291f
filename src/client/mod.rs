//! 远端讲解服务客户端：trait 抽象与实现（HTTP / Mock）

pub mod http;
pub mod mock;
pub mod traits;
pub mod wire;

pub use http::HttpExplainClient;
pub use mock::MockExplainClient;
pub use traits::ExplainClient;
