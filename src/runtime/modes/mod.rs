//! 运行模式：HTTP 服务（默认）或一次性的 CLI 命令

pub mod server;

pub use server::run_server;
