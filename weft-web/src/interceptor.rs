//! 拦截器
//!
//! 拦截器在处理器方法前后运行。处理器注册拦截器链 [a, b, c] 时，调用顺序是：
//!
//! ```text
//! a.before
//! b.before
//! c.before
//! handler.get / handler.post / ...
//! c.after
//! b.after
//! a.after
//! ```
//!
//! 某个 before 返回错误或已经写入了响应（重定向、渲染等）时链条中断。
//! 例如 b.before 返回错误，则只会调用：
//!
//! ```text
//! a.before
//! b.before
//! b.after
//! a.after
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use crate::context::RequestContext;
use crate::error::WebError;
use crate::response::ResponseSink;

/// 拦截器执行结果
pub type InterceptorResult<T> = Result<T, InterceptorError>;

#[derive(Debug, thiserror::Error)]
pub enum InterceptorError {
    #[error("Interceptor execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Access denied")]
    AccessDenied,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Request validation failed: {0}")]
    ValidationFailed(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InterceptorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ExecutionFailed(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// 拦截器 trait
///
/// 两个方法默认什么都不做，实现者只需覆盖需要的那个。
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 处理器方法执行前调用
    ///
    /// 返回错误，或者在 `response` 上写入了重定向/渲染/状态码，都会中断链条。
    async fn before(
        &self,
        _ctx: &mut RequestContext,
        _response: &mut ResponseSink,
    ) -> InterceptorResult<()> {
        Ok(())
    }

    /// 处理器方法执行后调用，只有 before 被调用过的拦截器才会收到
    ///
    /// `outcome` 是 before 阶段或处理器返回的错误。这里的失败只会被记录，
    /// 不影响其余拦截器的 after。
    async fn after(
        &self,
        _ctx: &mut RequestContext,
        _response: &mut ResponseSink,
        _outcome: Option<&WebError>,
    ) -> InterceptorResult<()> {
        Ok(())
    }
}

/// 什么都不做的拦截器
#[derive(Debug, Clone, Copy, Default)]
pub struct NopInterceptor;

impl Interceptor for NopInterceptor {
    fn name(&self) -> &str {
        "nop"
    }
}

/// 有序的拦截器链
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在链尾追加一个拦截器
    pub fn chain<I: Interceptor + 'static>(self, interceptor: I) -> Self {
        self.chain_arc(Arc::new(interceptor))
    }

    pub fn chain_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Arc<dyn Interceptor>> {
        self.interceptors.get(index)
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Interceptor>> for InterceptorChain {
    fn from_iter<T: IntoIterator<Item = Arc<dyn Interceptor>>>(iter: T) -> Self {
        Self {
            interceptors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Interceptor for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_chain_keeps_order() {
        let chain = InterceptorChain::new()
            .chain(Named("a"))
            .chain(Named("b"))
            .chain(NopInterceptor);

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.names(), vec!["a", "b", "nop"]);
        assert!(InterceptorChain::new().is_empty());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            InterceptorError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            InterceptorError::ValidationFailed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            InterceptorError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
