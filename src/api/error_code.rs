//! 统一 API 错误码定义

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::EngineError;

/// API 错误码枚举
///
/// 使用 serde_repr 序列化为数字。按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 3000-3099: 链接错误
/// - 4000-4099: 转化与佣金错误
/// - 5000-5099: 风控错误
/// - 6000-6099: 快照重载错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrorCode {
    // 成功
    Success = 0,

    // 通用错误 1000-1099
    BadRequest = 1000,
    Unauthorized = 1001,
    NotFound = 1004,
    InternalServerError = 1005,
    ServiceUnavailable = 1030,
    Timeout = 1031,

    // 链接错误 3000-3099
    LinkNotFound = 3000,
    LinkAlreadyExists = 3001,
    LinkInvalidUrl = 3002,
    LinkInvalidExpireTime = 3003,

    // 转化与佣金错误 4000-4099
    ConversionInvalid = 4000,
    IdempotencyKeyMismatch = 4001,
    CommissionNotFound = 4010,
    CommissionInvalidTransition = 4011,
    ExportInvalidConsumer = 4020,

    // 风控错误 5000-5099
    FraudFlagNotFound = 5000,

    // 快照重载错误 6000-6099
    CatalogReloadFailed = 6000,
    SegmentReloadFailed = 6001,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::NotFound(_) | EngineError::Expired(_) => ErrorCode::NotFound,
            EngineError::Validation(_) => ErrorCode::BadRequest,
            EngineError::DuplicateKey(_) => ErrorCode::LinkAlreadyExists,
            EngineError::Blocked(_) => ErrorCode::Unauthorized,
            EngineError::StoreUnavailable(_)
            | EngineError::CacheConnection(_)
            | EngineError::DatabaseConfig(_) => ErrorCode::ServiceUnavailable,
            EngineError::Timeout(_) => ErrorCode::Timeout,
            EngineError::DatabaseOperation(_)
            | EngineError::Serialization(_)
            | EngineError::Config(_)
            | EngineError::FileOperation(_) => ErrorCode::InternalServerError,
        }
    }
}

impl From<EngineError> for ErrorCode {
    fn from(err: EngineError) -> Self {
        ErrorCode::from(&err)
    }
}
