//! 协作方接口的响应构建

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::errors::EngineError;

use super::error_code::ErrorCode;
use super::types::ApiResponse;

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

/// 构建成功响应
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
}

/// 构建错误响应
pub fn error_response(status: StatusCode, error_code: ErrorCode, message: &str) -> HttpResponse {
    json_response::<()>(status, error_code, message, None)
}

/// 从 EngineError 构建错误响应（自动映射 HTTP 状态码和 ErrorCode）
pub fn error_from_engine(err: &EngineError) -> HttpResponse {
    let status = err.http_status();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    error_response(status, ErrorCode::from(err), err.message())
}

/// 统一 Result → HttpResponse 转换
pub fn api_result<T: Serialize>(result: crate::errors::Result<T>) -> HttpResponse {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_from_engine(&e),
    }
}

/// 十进制金额文本转为分，四舍五入（远离零）
///
/// 按位处理十进制数字，`1.005` 得到 101。支持 `1e2` 形式的指数。
pub fn decimal_to_cents(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], unsigned[pos + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let digits: Vec<i64> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b.is_ascii_digit().then(|| i64::from(b - b'0')))
        .collect::<Option<_>>()?;

    // 小数点右移两位后的位置
    let point = (int_part.len() as i64).checked_add(exponent)?.checked_add(2)?;
    let mut cents: i64 = 0;
    for &digit in digits.iter().take(point.clamp(0, digits.len() as i64) as usize) {
        cents = cents.checked_mul(10)?.checked_add(digit)?;
    }
    let mut shift = point - digits.len() as i64;
    while shift > 0 && cents != 0 {
        cents = cents.checked_mul(10)?;
        shift -= 1;
    }

    let round_up = usize::try_from(point)
        .ok()
        .and_then(|p| digits.get(p))
        .is_some_and(|&digit| digit >= 5);
    if round_up {
        cents = cents.checked_add(1)?;
    }
    Some(if negative { -cents } else { cents })
}
