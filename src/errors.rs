use std::fmt;

use actix_web::http::StatusCode;

#[derive(Debug, Clone)]
pub enum EngineError {
    NotFound(String),
    Expired(String),
    Blocked(String),
    StoreUnavailable(String),
    DuplicateKey(String),
    Validation(String),
    Timeout(String),
    CacheConnection(String),
    DatabaseConfig(String),
    DatabaseOperation(String),
    Serialization(String),
    Config(String),
    FileOperation(String),
}

impl EngineError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "E001",
            EngineError::Expired(_) => "E002",
            EngineError::Blocked(_) => "E003",
            EngineError::StoreUnavailable(_) => "E004",
            EngineError::DuplicateKey(_) => "E005",
            EngineError::Validation(_) => "E006",
            EngineError::Timeout(_) => "E007",
            EngineError::CacheConnection(_) => "E008",
            EngineError::DatabaseConfig(_) => "E009",
            EngineError::DatabaseOperation(_) => "E010",
            EngineError::Serialization(_) => "E011",
            EngineError::Config(_) => "E012",
            EngineError::FileOperation(_) => "E013",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "Resource Not Found",
            EngineError::Expired(_) => "Resource Expired",
            EngineError::Blocked(_) => "Actor Blocked",
            EngineError::StoreUnavailable(_) => "Store Unavailable",
            EngineError::DuplicateKey(_) => "Duplicate Key",
            EngineError::Validation(_) => "Validation Error",
            EngineError::Timeout(_) => "Timeout",
            EngineError::CacheConnection(_) => "Cache Connection Error",
            EngineError::DatabaseConfig(_) => "Database Configuration Error",
            EngineError::DatabaseOperation(_) => "Database Operation Error",
            EngineError::Serialization(_) => "Serialization Error",
            EngineError::Config(_) => "Configuration Error",
            EngineError::FileOperation(_) => "File Operation Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            EngineError::NotFound(msg)
            | EngineError::Expired(msg)
            | EngineError::Blocked(msg)
            | EngineError::StoreUnavailable(msg)
            | EngineError::DuplicateKey(msg)
            | EngineError::Validation(msg)
            | EngineError::Timeout(msg)
            | EngineError::CacheConnection(msg)
            | EngineError::DatabaseConfig(msg)
            | EngineError::DatabaseOperation(msg)
            | EngineError::Serialization(msg)
            | EngineError::Config(msg)
            | EngineError::FileOperation(msg) => msg,
        }
    }

    /// HTTP 状态码映射（仅用于面向协作方的结构化接口）
    pub fn http_status(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Expired(_) => StatusCode::GONE,
            EngineError::Blocked(_) => StatusCode::FORBIDDEN,
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::DuplicateKey(_) => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::CacheConnection(_)
            | EngineError::DatabaseConfig(_)
            | EngineError::DatabaseOperation(_)
            | EngineError::Serialization(_)
            | EngineError::Config(_)
            | EngineError::FileOperation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 调用方是否应该重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::Timeout(_)
        )
    }

    /// 格式化为彩色输出（用于启动失败）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for EngineError {}

// 便捷的构造函数
impl EngineError {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn expired<T: Into<String>>(msg: T) -> Self {
        EngineError::Expired(msg.into())
    }

    pub fn blocked<T: Into<String>>(msg: T) -> Self {
        EngineError::Blocked(msg.into())
    }

    pub fn store_unavailable<T: Into<String>>(msg: T) -> Self {
        EngineError::StoreUnavailable(msg.into())
    }

    pub fn duplicate_key<T: Into<String>>(msg: T) -> Self {
        EngineError::DuplicateKey(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        EngineError::Timeout(msg.into())
    }

    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        EngineError::CacheConnection(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        EngineError::DatabaseConfig(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        EngineError::DatabaseOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        EngineError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        EngineError::Config(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        EngineError::FileOperation(msg.into())
    }
}

// 连接层面的失败视为存储不可用，其余数据库错误按操作错误处理
impl From<sea_orm::DbErr> for EngineError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::DbErr;
        match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                EngineError::StoreUnavailable(err.to_string())
            }
            other => EngineError::DatabaseOperation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::CacheConnection(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        EngineError::Timeout(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let errors = vec![
            EngineError::not_found(""),
            EngineError::expired(""),
            EngineError::blocked(""),
            EngineError::store_unavailable(""),
            EngineError::duplicate_key(""),
            EngineError::validation(""),
            EngineError::timeout(""),
            EngineError::cache_connection(""),
            EngineError::database_config(""),
            EngineError::database_operation(""),
            EngineError::serialization(""),
            EngineError::config(""),
            EngineError::file_operation(""),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            EngineError::not_found("x").http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(EngineError::expired("x").http_status(), StatusCode::GONE);
        assert_eq!(
            EngineError::store_unavailable("x").http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            EngineError::validation("x").http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_connection_errors_become_store_unavailable() {
        let err: EngineError =
            sea_orm::DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout).into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let err: EngineError = sea_orm::DbErr::RecordNotFound("x".into()).into();
        assert!(matches!(err, EngineError::DatabaseOperation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_format_simple() {
        let err = EngineError::validation("value must be positive");
        assert_eq!(
            err.format_simple(),
            "Validation Error: value must be positive"
        );
        assert_eq!(err.to_string(), err.format_simple());
    }
}
