//! 应用生命周期：启动准备、HTTP 服务、优雅关闭

pub mod lifetime;
pub mod modes;
