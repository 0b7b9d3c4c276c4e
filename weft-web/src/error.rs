//! 请求级错误
//!
//! 分发过程中的失败都收敛成 `WebError`：拦截器失败、处理器失败、模板失败、
//! 参数解析失败以及处理器 panic。它们只会被记录并转换成具体的 HTTP 响应，
//! 不会越过请求边界向传输层传播。

use http::StatusCode;
use thiserror::Error;

use crate::interceptor::InterceptorError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum WebError {
    /// 拦截器的 before/after 返回了错误
    #[error("Interceptor '{interceptor}' failed: {source}")]
    Interceptor {
        interceptor: String,
        #[source]
        source: InterceptorError,
    },

    /// 处理器返回的业务错误 - 500
    #[error("Handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    /// 处理器主动给出的状态码和消息
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// 路径参数缺失或无法解析 - 400
    #[error("Invalid path parameter '{name}': {message}")]
    PathParse { name: String, message: String },

    /// 请求体读取失败
    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// 处理器 panic，由 `Mux` 在最外层捕获
    #[error("Handler panicked: {0}")]
    Panic(String),
}

impl WebError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        WebError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn interceptor(name: &str, source: InterceptorError) -> Self {
        WebError::Interceptor {
            interceptor: name.to_string(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::Interceptor { source, .. } => source.status_code(),
            WebError::Status { status, .. } => *status,
            WebError::PathParse { .. } | WebError::Body(_) => StatusCode::BAD_REQUEST,
            WebError::Handler(_) | WebError::Template(_) | WebError::Panic(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 可以展示给客户端的消息
    ///
    /// 4xx 返回错误本身的描述，5xx 只返回状态码的标准短语，内部细节只进日志。
    pub fn public_message(&self) -> String {
        let status = self.status_code();
        if status.is_client_error() {
            match self {
                WebError::Interceptor { source, .. } => source.to_string(),
                other => other.to_string(),
            }
        } else {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        }
    }
}
