//! # Weft Web
//!
//! 请求路由与拦截器分发，基于 Axum 构建
//!
//! ## 核心特性
//!
//! - **路由树** - 字面量段与 `{name}` 通配段，注册时检测冲突
//! - **前缀路由** - 更深的未注册路径回落到前缀处理器，静态文件即基于此
//! - **拦截器链** - before 顺序执行、after 逆序执行，任一 before 失败即短路
//! - **按请求创建处理器** - 处理器在自己的字段里保存请求级状态
//! - **延迟提交响应** - 处理器只记录意图，管道结束时恰好提交一次
//!
//! ## 示例
//!
//! ```ignore
//! use weft_web::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeting;
//!
//! #[async_trait]
//! impl Handler for Greeting {
//!     async fn get(&mut self, ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
//!         let name = ctx.params().get("name").unwrap_or("world");
//!         response.text(format!("hello {}", name));
//!         Ok(())
//!     }
//! }
//!
//! let mux = Mux::new();
//! mux.register("/hello/{name}", Greeting::default)?;
//! WebServer::new(ServerProperties::default(), mux).run().await?;
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod mux;
pub mod params;
pub mod response;
pub mod router;
pub mod server;
pub mod template;
pub mod token;

pub mod prelude {
    //! 预导入模块

    pub use crate::context::RequestContext;
    pub use crate::dispatch::ErrorObserver;
    pub use crate::error::WebError;
    pub use crate::handler::{Endpoint, Handler, HandlerFactory, HandlerResult, StaticFiles, Verb};
    pub use crate::interceptor::{
        Interceptor, InterceptorChain, InterceptorError, InterceptorResult, NopInterceptor,
    };
    pub use crate::mux::Mux;
    pub use crate::params::PathParams;
    pub use crate::response::ResponseSink;
    pub use crate::router::{RouteError, RouteMatch, Router};
    pub use crate::server::{ServerProperties, WebServer};
    pub use crate::template::{Renderer, TemplateEngine, TemplateError, TemplateProperties};

    pub use async_trait::async_trait;
    pub use axum::http::StatusCode;
    pub use cookie::Cookie;
    pub use serde_json::json;
}
