//! 响应收集器
//!
//! 处理器和拦截器不直接写响应，而是向 [`ResponseSink`] 记录意图：重定向、渲染模板、
//! 写入响应体、设置状态码或记录错误。分发管道在所有 after 调用结束后调用一次
//! [`ResponseSink::finalize`]，它按值消费收集器，所以不可能被提交两次。

use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cookie::Cookie;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::WebError;
use crate::template::{Renderer, TemplateError};

enum Intent {
    Render { name: String, data: Value },
    Redirect { location: String, status: StatusCode },
    Body { bytes: Bytes, content_type: HeaderValue },
    Error(WebError),
}

pub struct ResponseSink {
    intent: Option<Intent>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    renderer: Option<Arc<dyn Renderer>>,
    error_template: Option<Arc<str>>,
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let intent = match &self.intent {
            None => "none",
            Some(Intent::Render { .. }) => "render",
            Some(Intent::Redirect { .. }) => "redirect",
            Some(Intent::Body { .. }) => "body",
            Some(Intent::Error(_)) => "error",
        };
        f.debug_struct("ResponseSink")
            .field("intent", &intent)
            .field("status", &self.status)
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink {
    pub fn new() -> Self {
        Self {
            intent: None,
            status: None,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
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

    /// 错误意图一旦记录就不会被后续意图覆盖
    fn set_intent(&mut self, intent: Intent) {
        if !matches!(self.intent, Some(Intent::Error(_))) {
            self.intent = Some(intent);
        }
    }

    pub fn redirect(&mut self, location: impl Into<String>, status: StatusCode) {
        self.set_intent(Intent::Redirect {
            location: location.into(),
            status,
        });
    }

    /// 渲染模板，模板名只取最后一段路径
    pub fn render<T: Serialize + ?Sized>(&mut self, name: &str, data: &T) {
        let name = name.rsplit('/').next().unwrap_or(name).to_string();
        match serde_json::to_value(data) {
            Ok(data) => self.set_intent(Intent::Render { name, data }),
            Err(e) => self.error(WebError::Template(TemplateError::DataError {
                template: name,
                cause: e.to_string(),
            })),
        }
    }

    pub fn body(&mut self, bytes: impl Into<Bytes>, content_type: &'static str) {
        self.set_intent(Intent::Body {
            bytes: bytes.into(),
            content_type: HeaderValue::from_static(content_type),
        });
    }

    pub fn text(&mut self, text: impl Into<String>) {
        self.body(text.into(), "text/plain; charset=utf-8");
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body(bytes, "application/json"),
            Err(e) => self.error(WebError::Handler(anyhow::Error::new(e))),
        }
    }

    pub fn error(&mut self, err: WebError) {
        if !matches!(self.intent, Some(Intent::Error(_))) {
            self.intent = Some(Intent::Error(err));
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    /// 是否已经有了确定的响应：重定向、渲染、响应体、错误或显式状态码。
    /// 只设置了 cookie 或响应头不算。
    pub fn is_committed(&self) -> bool {
        self.intent.is_some() || self.status.is_some()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// 生成最终响应
    ///
    /// 没有任何意图时返回 500。
    pub fn finalize(self) -> Response {
        let Self {
            intent,
            status,
            headers,
            cookies,
            renderer,
            error_template,
        } = self;

        let mut response = match intent {
            Some(Intent::Render { name, data }) => {
                render_page(renderer.as_deref(), &name, &data, status.unwrap_or(StatusCode::OK))
            }
            Some(Intent::Redirect { location, status }) => redirect(&location, status),
            Some(Intent::Body { bytes, content_type }) => (
                status.unwrap_or(StatusCode::OK),
                [(header::CONTENT_TYPE, content_type)],
                bytes,
            )
                .into_response(),
            Some(Intent::Error(err)) => {
                error_page(renderer.as_deref(), error_template.as_deref(), &err)
            }
            None => match status {
                Some(status) => status.into_response(),
                None => {
                    tracing::warn!("No response was written, answering with 500");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
        };

        response.headers_mut().extend(headers);
        for cookie in cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!(cookie = cookie.name(), error = %e, "Invalid cookie"),
            }
        }
        response
    }
}

fn render_page(renderer: Option<&dyn Renderer>, name: &str, data: &Value, status: StatusCode) -> Response {
    let result = renderer
        .ok_or_else(|| TemplateError::NoRenderer(name.to_string()))
        .and_then(|r| r.render(name, data));

    match result {
        Ok(html) => (status, html_content_type(), html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, template = %name, "Template render error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn redirect(location: &str, status: StatusCode) -> Response {
    match HeaderValue::try_from(location) {
        Ok(value) if status.is_redirection() => {
            (status, [(header::LOCATION, value)]).into_response()
        }
        Ok(_) => {
            tracing::error!(status = %status, "Redirect with a non-3xx status");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(location = %location, error = %e, "Invalid redirect location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error_page(renderer: Option<&dyn Renderer>, template: Option<&str>, err: &WebError) -> Response {
    let status = err.status_code();
    let message = err.public_message();

    if let (Some(renderer), Some(template)) = (renderer, template) {
        let data = json!({ "status": status.as_u16(), "message": message });
        match renderer.render(template, &data) {
            Ok(html) => return (status, html_content_type(), html).into_response(),
            Err(e) => tracing::error!(error = %e, template = %template, "Error template failed"),
        }
    }

    (status, Body::from(message)).into_response()
}

fn html_content_type() -> [(HeaderName, HeaderValue); 1] {
    [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))]
}
