//! 请求多路复用器
//!
//! [`Mux`] 持有路由树，负责注册处理器并把每个请求交给分发管道。
//!
//! ```ignore
//! let mux = Mux::new().with_renderer(Arc::new(TemplateEngine::new("templates/**/*.html")?));
//! mux.register("/users/{id}", || UserPage::default())?;
//! mux.register_static("/static", "./public")?;
//!
//! WebServer::new(ServerProperties::default(), mux).run().await?;
//! ```
//!
//! 注册在写锁下进行，可以与请求处理交错；匹配只在读锁下进行，锁在进入分发管道前释放。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use http::{header, StatusCode, Uri};
use parking_lot::RwLock;
use tower::ServiceExt;
use tracing::Instrument;
use weft_core::Environment;

use crate::context::RequestContext;
use crate::dispatch::{default_error_observer, dispatch, ErrorObserver};
use crate::error::WebError;
use crate::handler::{Endpoint, HandlerFactory, StaticFiles, Target};
use crate::response::ResponseSink;
use crate::router::{RouteError, Router};
use crate::server::{ServerProperties, DEFAULT_MAX_BODY_SIZE};
use crate::template::{Renderer, TemplateEngine, TemplateError, TemplateProperties};

/// panic 钩子，参数是 panic 消息
pub type PanicHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Mux {
    router: RwLock<Router<Endpoint>>,
    renderer: Option<Arc<dyn Renderer>>,
    error_template: Option<Arc<str>>,
    on_error: ErrorObserver,
    on_panic: Option<PanicHook>,
    max_body_size: usize,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("routes", &self.router.read().len())
            .field("renderer", &self.renderer.is_some())
            .field("error_template", &self.error_template)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

impl Mux {
    pub fn new() -> Self {
        Self {
            router: RwLock::new(Router::new()),
            renderer: None,
            error_template: None,
            on_error: default_error_observer(),
            on_panic: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// 按配置创建：请求体上限、模板目录和错误模板
    pub fn from_environment(env: &Environment) -> Result<Self, TemplateError> {
        let server = ServerProperties::from_environment(env);
        let templates = TemplateProperties::from_environment(env);

        let mut mux = Self::new().with_max_body_size(server.max_body_size);
        if let Some(engine) = TemplateEngine::from_properties(&templates)? {
            mux = mux.with_renderer(Arc::new(engine));
        }
        if let Some(template) = templates.error_template {
            mux = mux.with_error_template(template);
        }
        Ok(mux)
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// 出错时渲染的模板，数据为 `{ status, message }`
    pub fn with_error_template(mut self, template: impl Into<String>) -> Self {
        self.error_template = Some(Arc::from(template.into()));
        self
    }

    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// 替换错误观察者，默认写 `tracing::error!`
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&WebError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(observer);
        self
    }

    pub fn on_panic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(hook));
        self
    }

    /// 注册处理器，`factory` 在每个请求到来时调用一次
    pub fn register(&self, path: &str, factory: impl HandlerFactory + 'static) -> Result<(), RouteError> {
        self.register_endpoint(path, Endpoint::handler(factory))
    }

    /// 注册前缀处理器：更深的未注册路径也会落到这里，剩余部分见 `RequestContext::remainder`
    pub fn register_prefix(
        &self,
        path: &str,
        factory: impl HandlerFactory + 'static,
    ) -> Result<(), RouteError> {
        self.register_prefix_endpoint(path, Endpoint::handler(factory))
    }

    /// 把 `dir` 下的文件挂到 `path` 之下，不经过拦截器
    pub fn register_static(&self, path: &str, dir: impl Into<PathBuf>) -> Result<(), RouteError> {
        self.register_prefix_endpoint(path, Endpoint::static_files(StaticFiles::new(dir)))
    }

    pub fn register_endpoint(&self, path: &str, endpoint: Endpoint) -> Result<(), RouteError> {
        self.router.write().append_route(path, endpoint).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "Route registration rejected");
            e
        })?;
        tracing::debug!(path = %path, "Route registered");
        Ok(())
    }

    pub fn register_prefix_endpoint(&self, path: &str, endpoint: Endpoint) -> Result<(), RouteError> {
        self.router.write().append_prefix_route(path, endpoint).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "Prefix route registration rejected");
            e
        })?;
        tracing::debug!(path = %path, "Prefix route registered");
        Ok(())
    }

    pub fn routes(&self) -> usize {
        self.router.read().len()
    }

    /// 处理一个请求，总是返回一个响应
    pub async fn serve(&self, request: Request) -> Response {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            id = %request_id,
            method = %request.method(),
            path = %request.uri().path()
        );
        self.serve_matched(request).instrument(span).await
    }

    async fn serve_matched(&self, request: Request) -> Response {
        let found = self.router.read().find(request.uri().path());
        let route = match found {
            Ok(route) => route,
            Err(e) => {
                tracing::debug!(error = %e, "No route matched");
                let mut sink = self.default_sink();
                sink.error(WebError::not_found("Not Found"));
                return sink.finalize();
            }
        };

        let endpoint = route.record;
        let factory = match &endpoint.target {
            Target::Static(files) => return serve_static(files, &route.remainder, request).await,
            Target::Handler(factory) => Arc::clone(factory),
        };
        let mut sink = endpoint.response_sink(self.renderer.as_ref(), self.error_template.as_ref());

        let (parts, body) = request.into_parts();
        let body = match self.read_body(&parts.headers, body).await {
            Ok(body) => body,
            Err(e) => {
                (self.on_error)(&e);
                sink.error(e);
                return sink.finalize();
            }
        };

        let ctx = RequestContext::new(parts, body)
            .with_params(route.params)
            .with_remainder(route.remainder);

        let error_sink = endpoint.response_sink(self.renderer.as_ref(), self.error_template.as_ref());
        let on_error = &self.on_error;
        let pipeline = async move {
            let handler = factory.create();
            dispatch(handler, ctx, sink, on_error).await
        };

        match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => self.recover(panic, error_sink),
        }
    }

    async fn read_body(&self, headers: &http::HeaderMap, body: Body) -> Result<bytes::Bytes, WebError> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(WebError::status(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Request body exceeds {} bytes", self.max_body_size),
            ));
        }

        axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| WebError::Body(e.to_string()))
    }

    fn recover(&self, panic: Box<dyn Any + Send>, mut sink: ResponseSink) -> Response {
        let message = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "Unknown panic occurred".to_string()
        };

        tracing::error!(error = %message, "Handler panicked");
        if let Some(hook) = &self.on_panic {
            hook(&message);
        }

        sink.error(WebError::Panic(message));
        sink.finalize()
    }

    fn default_sink(&self) -> ResponseSink {
        ResponseSink::new()
            .with_renderer(self.renderer.clone())
            .with_error_template(self.error_template.clone())
    }

    /// 生成一个把所有请求交给 `serve` 的 axum 路由
    pub fn router(self: &Arc<Self>) -> axum::Router {
        let mux = Arc::clone(self);
        axum::Router::new().fallback(move |request: Request| {
            let mux = Arc::clone(&mux);
            async move { mux.serve(request).await }
        })
    }

    pub fn into_router(self) -> axum::Router {
        Arc::new(self).router()
    }
}

/// 用剩余路径在静态目录中查找文件，保留查询串
async fn serve_static(files: &StaticFiles, remainder: &str, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let target = match parts.uri.query() {
        Some(query) => format!("/{}?{}", remainder, query),
        None => format!("/{}", remainder),
    };
    parts.uri = match target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid static file path");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match files.service().oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response.map(Body::new),
        Err(infallible) => match infallible {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, HandlerResult};
    use crate::interceptor::{Interceptor, InterceptorChain, InterceptorError, InterceptorResult};
    use async_trait::async_trait;
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Hello;

    #[async_trait]
    impl Handler for Hello {
        async fn get(&mut self, ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            let name = ctx.params().get("name").unwrap_or("world").to_string();
            response.text(format!("hello {}", name));
            Ok(())
        }

        async fn post(&mut self, ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            response.body(ctx.body().clone(), "application/octet-stream");
            Ok(())
        }
    }

    struct Remainder;

    #[async_trait]
    impl Handler for Remainder {
        async fn get(&mut self, ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            response.json(&json!({ "remainder": ctx.remainder(), "id": ctx.params().get("id") }));
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Handler for Panicking {
        async fn get(&mut self, _ctx: &mut RequestContext, _response: &mut ResponseSink) -> HandlerResult {
            panic!("handler exploded");
        }
    }

    struct RequireLogin;

    #[async_trait]
    impl Interceptor for RequireLogin {
        fn name(&self) -> &str {
            "require-login"
        }

        async fn before(&self, ctx: &mut RequestContext, _response: &mut ResponseSink) -> InterceptorResult<()> {
            match ctx.cookie("session") {
                Some(_) => Ok(()),
                None => Err(InterceptorError::AuthenticationRequired),
            }
        }
    }

    struct Private;

    #[async_trait]
    impl Handler for Private {
        fn interceptors(&self) -> InterceptorChain {
            InterceptorChain::new().chain(RequireLogin)
        }

        async fn get(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            response.text("secret");
            Ok(())
        }
    }

    struct Rendering;

    #[async_trait]
    impl Handler for Rendering {
        async fn get(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            response.render("page.html", &json!({ "name": "galo" }));
            Ok(())
        }

        async fn post(&mut self, _ctx: &mut RequestContext, _response: &mut ResponseSink) -> HandlerResult {
            Err(WebError::not_found("gone"))
        }
    }

    #[derive(Default)]
    struct Counter {
        hits: u32,
    }

    #[async_trait]
    impl Handler for Counter {
        async fn get(&mut self, _ctx: &mut RequestContext, response: &mut ResponseSink) -> HandlerResult {
            self.hits += 1;
            response.text(self.hits.to_string());
            Ok(())
        }
    }

    fn renderer(label: &str, error_name: &str) -> Arc<dyn Renderer> {
        let engine = TemplateEngine::empty();
        engine
            .add_raw_template("page.html", &format!("{} {{{{ name }}}}", label))
            .unwrap();
        engine
            .add_raw_template(error_name, &format!("{} {{{{ status }}}} {{{{ message }}}}", label))
            .unwrap();
        Arc::new(engine)
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_params_reach_handler() {
        let mux = Mux::new();
        mux.register("/hello/{name}", || Hello).unwrap();

        let response = mux.serve(get("/hello/ana")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "hello ana");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let mux = Mux::new();
        mux.register("/hello", || Hello).unwrap();

        let response = mux.serve(get("/bye")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registration_conflicts_are_returned() {
        let mux = Mux::new();
        mux.register("/users/{id}", || Hello).unwrap();

        assert_eq!(mux.register("/users/{id}", || Hello), Err(RouteError::RouteAlreadyExists));
        assert_eq!(mux.register("/users/{name}/posts", || Hello), Err(RouteError::WildcardConflict));
        assert_eq!(mux.routes(), 1);
    }

    #[tokio::test]
    async fn test_prefix_handler_receives_remainder() {
        let mux = Mux::new();
        mux.register_prefix("/files/{id}", || Remainder).unwrap();

        let response = mux.serve(get("/files/7/a/b.txt")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"id":"7","remainder":"a/b.txt"}"#);
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let mux = Mux::new().on_panic(move |message| hook_seen.lock().push(message.to_string()));
        mux.register("/boom", || Panicking).unwrap();

        let response = mux.serve(get("/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*seen.lock(), vec!["handler exploded".to_string()]);
        assert_eq!(body_string(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_interceptor_rejection_uses_error_template() {
        let engine = TemplateEngine::empty();
        engine.add_raw_template("error.html", "<h1>{{ status }}</h1>{{ message }}").unwrap();
        let mux = Mux::new()
            .with_renderer(Arc::new(engine))
            .with_error_template("error.html");
        mux.register("/private", || Private).unwrap();

        let response = mux.serve(get("/private")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "<h1>401</h1>Authentication required");

        let request = Request::builder()
            .uri("/private")
            .header(header::COOKIE, "session=abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(body_string(mux.serve(request).await).await, "secret");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mux = Mux::new().with_max_body_size(4);
        mux.register("/echo", || Hello).unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_LENGTH, "10")
            .body(Body::from("0123456789"))
            .unwrap();
        assert_eq!(mux.serve(request).await.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Body::from("abc"))
            .unwrap();
        assert_eq!(body_string(mux.serve(request).await).await, "abc");
    }

    #[tokio::test]
    async fn test_static_files() {
        let dir = std::env::temp_dir().join(format!("weft-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("css")).unwrap();
        std::fs::write(dir.join("css/site.css"), "body { color: red }").unwrap();

        let mux = Mux::new();
        mux.register_static("/static", &dir).unwrap();

        let response = mux.serve(get("/static/css/site.css")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "body { color: red }");

        let response = mux.serve(get("/static/css/missing.css")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_axum_router_fallback() {
        let mux = Mux::new();
        mux.register("/hello/{name}", || Hello).unwrap();
        let app = mux.into_router();

        let response = app.clone().oneshot(get("/hello/galo")).await.unwrap();
        assert_eq!(body_string(response).await, "hello galo");

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/hello/galo")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_endpoint_render_context_overrides_mux_default() {
        let mux = Mux::new()
            .with_renderer(renderer("mux", "error.html"))
            .with_error_template("error.html");
        mux.register("/default", || Rendering).unwrap();
        mux.register_endpoint(
            "/own",
            Endpoint::handler(|| Rendering)
                .with_renderer(Some(renderer("own", "own-error.html")))
                .with_error_template(Some(Arc::from("own-error.html"))),
        )
        .unwrap();

        assert_eq!(body_string(mux.serve(get("/default")).await).await, "mux galo");
        assert_eq!(body_string(mux.serve(get("/own")).await).await, "own galo");

        let post = |uri: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        let response = mux.serve(post("/default")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "mux 404 gone");

        let response = mux.serve(post("/own")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "own 404 gone");
    }

    #[tokio::test]
    async fn test_each_request_gets_a_fresh_handler() {
        let created = Arc::new(AtomicUsize::new(0));
        let factory_count = created.clone();

        let mux = Mux::new();
        mux.register("/count", move || {
            factory_count.fetch_add(1, Ordering::SeqCst);
            Counter::default()
        })
        .unwrap();

        assert_eq!(body_string(mux.serve(get("/count")).await).await, "1");
        assert_eq!(body_string(mux.serve(get("/count")).await).await, "1");
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            weft_core::MapPropertySource::new("test")
                .with_property(weft_core::constants::SERVER_MAX_BODY_SIZE, 16i64)
                .with_property(weft_core::constants::TEMPLATES_ERROR_TEMPLATE, "oops.html"),
        ));

        let mux = Mux::from_environment(&env).unwrap();
        assert_eq!(mux.max_body_size, 16);
        assert_eq!(mux.error_template.as_deref(), Some("oops.html"));
        assert!(mux.renderer.is_none());
    }
}
