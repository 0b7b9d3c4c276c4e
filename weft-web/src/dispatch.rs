//! 分发管道
//!
//! 一次请求经历四个阶段：
//!
//! - `Before`：按顺序调用拦截器的 before，出错或响应已提交时立即停止
//! - `Invoke`：before 全部通过时调用与请求方法对应的处理器方法
//! - `After`：逆序调用 before 已经运行过的拦截器的 after，失败不影响后续
//! - `Done`：提交响应，恰好一次
//!
//! 无法识别的请求方法不进入任何阶段，直接返回 501。

use std::sync::Arc;

use axum::response::Response;
use http::StatusCode;

use crate::context::RequestContext;
use crate::error::WebError;
use crate::handler::{Handler, Verb};
use crate::interceptor::InterceptorChain;
use crate::response::ResponseSink;

/// 错误观察者，接收分发过程中的所有失败
pub type ErrorObserver = Arc<dyn Fn(&WebError) + Send + Sync>;

pub fn default_error_observer() -> ErrorObserver {
    Arc::new(|err: &WebError| {
        tracing::error!(error = %err, status = %err.status_code(), "Request failed");
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Before,
    Invoke,
    After,
    Done,
}

struct Pipeline<'a> {
    handler: Box<dyn Handler>,
    chain: InterceptorChain,
    verb: Verb,
    ctx: RequestContext,
    response: ResponseSink,
    on_error: &'a ErrorObserver,
    stage: Stage,
    /// before 已经运行过的拦截器个数
    entered: usize,
    outcome: Option<WebError>,
}

impl<'a> Pipeline<'a> {
    async fn run(mut self) -> Response {
        loop {
            self.stage = match self.stage {
                Stage::Before => self.before().await,
                Stage::Invoke => self.invoke().await,
                Stage::After => self.after().await,
                Stage::Done => return self.done(),
            };
        }
    }

    async fn before(&mut self) -> Stage {
        while let Some(interceptor) = self.chain.get(self.entered) {
            self.entered += 1;

            if let Err(e) = interceptor.before(&mut self.ctx, &mut self.response).await {
                tracing::debug!(interceptor = interceptor.name(), error = %e, "Interceptor rejected request");
                self.outcome = Some(WebError::interceptor(interceptor.name(), e));
                return Stage::After;
            }

            if self.response.is_committed() {
                tracing::debug!(interceptor = interceptor.name(), "Interceptor committed the response");
                return Stage::After;
            }
        }
        Stage::Invoke
    }

    async fn invoke(&mut self) -> Stage {
        if let Err(e) = self
            .verb
            .invoke(self.handler.as_mut(), &mut self.ctx, &mut self.response)
            .await
        {
            self.outcome = Some(e);
        }
        Stage::After
    }

    async fn after(&mut self) -> Stage {
        for index in (0..self.entered).rev() {
            let Some(interceptor) = self.chain.get(index) else {
                continue;
            };
            let outcome = self.outcome.as_ref();
            if let Err(e) = interceptor.after(&mut self.ctx, &mut self.response, outcome).await {
                (self.on_error)(&WebError::interceptor(interceptor.name(), e));
            }
        }
        Stage::Done
    }

    fn done(self) -> Response {
        let Self {
            mut response,
            outcome,
            on_error,
            ..
        } = self;

        if let Some(err) = outcome {
            on_error(&err);
            // 已经提交的响应优先，例如拦截器先写了重定向再返回错误
            if !response.is_committed() {
                response.error(err);
            }
        }
        response.finalize()
    }
}

/// 对一个新建的处理器运行整条管道
pub async fn dispatch(
    handler: Box<dyn Handler>,
    ctx: RequestContext,
    mut response: ResponseSink,
    on_error: &ErrorObserver,
) -> Response {
    let Some(verb) = Verb::from_method(ctx.method()) else {
        tracing::debug!(method = %ctx.method(), path = %ctx.path(), "Method not implemented");
        response.set_status(StatusCode::NOT_IMPLEMENTED);
        return response.finalize();
    };

    let chain = handler.interceptors();
    Pipeline {
        handler,
        chain,
        verb,
        ctx,
        response,
        on_error,
        stage: Stage::Before,
        entered: 0,
        outcome: None,
    }
    .run()
    .await
}
