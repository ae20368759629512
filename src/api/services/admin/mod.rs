//! 运营接口：链接配置、风控复核、快照刷新

pub mod fraud;
pub mod links;
pub mod reload;
pub mod routes;

pub use routes::admin_routes;
