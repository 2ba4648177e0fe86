//! Trace-context propagating HTTP→CoAP/HTTP gateway library

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod report;
pub mod terminal;
pub mod trace;

pub use config::schema::BridgeConfig;
pub use error::ServiceError;
pub use gateway::Gateway;
pub use lifecycle::Shutdown;
pub use terminal::Terminal;
