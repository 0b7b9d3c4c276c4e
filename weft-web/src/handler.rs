//! 处理器与处理器记录
//!
//! 注册时登记的不是处理器实例而是它的工厂：每个请求到来时都会新建一个处理器，
//! 所以处理器可以在自己的字段里保存请求级状态，无需加锁。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tower_http::services::ServeDir;

use crate::context::RequestContext;
use crate::error::WebError;
use crate::interceptor::InterceptorChain;
use crate::response::ResponseSink;
use crate::template::Renderer;

pub type HandlerResult = Result<(), WebError>;

/// 分发管道认识的请求方法，其余方法直接返回 501
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::DELETE => Some(Verb::Delete),
            Method::PATCH => Some(Verb::Patch),
            Method::HEAD => Some(Verb::Head),
            _ => None,
        }
    }

    pub(crate) async fn invoke(
        self,
        handler: &mut dyn Handler,
        ctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> HandlerResult {
        match self {
            Verb::Get => handler.get(ctx, response).await,
            Verb::Post => handler.post(ctx, response).await,
            Verb::Put => handler.put(ctx, response).await,
            Verb::Delete => handler.delete(ctx, response).await,
            Verb::Patch => handler.patch(ctx, response).await,
            Verb::Head => handler.head(ctx, response).await,
        }
    }
}

fn method_not_allowed(response: &mut ResponseSink) -> HandlerResult {
    response.set_status(StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

/// 处理器 trait
///
/// 每个请求方法一个方法，未实现的方法返回 405。
///
/// ```ignore
/// struct UserPage { user: Option<User> }
///
/// #[async_trait]
/// impl Handler for UserPage {
///     fn interceptors(&self) -> InterceptorChain {
///         InterceptorChain::new().chain(SessionInterceptor)
///     }
///
///     async fn get(&mut self, ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
///         let id: u64 = ctx.param("id")?;
///         response.render("user.html", &json!({ "id": id }));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send {
    fn interceptors(&self) -> InterceptorChain {
        InterceptorChain::new()
    }

    async fn get(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }

    async fn post(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }

    async fn put(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }

    async fn delete(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }

    async fn patch(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }

    async fn head(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
        method_not_allowed(response)
    }
}

/// 处理器工厂，每个请求调用一次
pub trait HandlerFactory: Send + Sync {
    fn create(&self) -> Box<dyn Handler>;
}

impl<F, H> HandlerFactory for F
where
    F: Fn() -> H + Send + Sync,
    H: Handler + 'static,
{
    fn create(&self) -> Box<dyn Handler> {
        Box::new(self())
    }
}

/// 前缀路由下的静态文件目录
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    service: ServeDir,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            service: ServeDir::new(&root),
            root,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub(crate) fn service(&self) -> ServeDir {
        self.service.clone()
    }
}

#[derive(Clone)]
pub(crate) enum Target {
    Handler(Arc<dyn HandlerFactory>),
    Static(Arc<StaticFiles>),
}

/// 处理器记录
///
/// 注册时创建，之后不再修改。路由匹配返回的是它的浅拷贝，
/// 所有字段都是 `Arc`，拷贝代价很小。
#[derive(Clone)]
pub struct Endpoint {
    pub(crate) target: Target,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) error_template: Option<Arc<str>>,
}

impl Endpoint {
    pub fn handler(factory: impl HandlerFactory + 'static) -> Self {
        Self::from_target(Target::Handler(Arc::new(factory)))
    }

    pub fn static_files(files: StaticFiles) -> Self {
        Self::from_target(Target::Static(Arc::new(files)))
    }

    fn from_target(target: Target) -> Self {
        Self {
            target,
            renderer: None,
            error_template: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Option<Arc<dyn Renderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_error_template(mut self, template: Option<Arc<str>>) -> Self {
        self.error_template = template;
        self
    }

    /// 该记录的空响应收集器，记录自身没有渲染上下文时使用传入的默认值
    pub fn response_sink(
        &self,
        renderer: Option<&Arc<dyn Renderer>>,
        error_template: Option<&Arc<str>>,
    ) -> ResponseSink {
        ResponseSink::new()
            .with_renderer(self.renderer.clone().or_else(|| renderer.cloned()))
            .with_error_template(self.error_template.clone().or_else(|| error_template.cloned()))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            Target::Handler(_) => "handler".to_string(),
            Target::Static(files) => format!("static({})", files.root().display()),
        };
        f.debug_struct("Endpoint")
            .field("target", &target)
            .field("renderer", &self.renderer.is_some())
            .field("error_template", &self.error_template)
            .finish()
    }
}
