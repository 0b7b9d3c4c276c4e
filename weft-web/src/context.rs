//! 请求上下文
//!
//! 一次请求内拦截器和处理器共享的数据：请求头、请求体、路径参数，
//! 以及通过 `extensions` 传递的请求级状态（例如拦截器解析出的当前用户）。

use std::str::FromStr;

use bytes::Bytes;
use cookie::Cookie;
use http::{request::Parts, Extensions, HeaderMap, Method, Uri};

use crate::error::WebError;
use crate::params::PathParams;

#[derive(Debug)]
pub struct RequestContext {
    parts: Parts,
    body: Bytes,
    params: PathParams,
    remainder: String,
}

impl RequestContext {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            parts,
            body,
            params: PathParams::new(),
            remainder: String::new(),
        }
    }

    pub fn with_params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_remainder(mut self, remainder: impl Into<String>) -> Self {
        self.remainder = remainder.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// 解析路径参数，等价于 `self.params().parse(name)`
    pub fn param<T>(&self, name: &str) -> Result<T, WebError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.params.parse(name)
    }

    /// 前缀路由下未匹配的路径剩余部分
    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    /// 读取请求携带的 cookie，解析失败的条目会被跳过
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.parts
            .headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| Cookie::split_parse(header.to_string()))
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == name)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(builder: http::request::Builder) -> RequestContext {
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestContext::new(parts, Bytes::from_static(b"payload"))
    }

    #[test]
    fn test_accessors() {
        let params: PathParams = [("id", "7")].into_iter().collect();
        let ctx = context(http::Request::builder().method(Method::POST).uri("/users/7?full=1"))
            .with_params(params);

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users/7");
        assert_eq!(ctx.query(), Some("full=1"));
        assert_eq!(ctx.body().as_ref(), b"payload");
        assert_eq!(ctx.param::<u32>("id").unwrap(), 7);
        assert_eq!(ctx.remainder(), "");
    }

    #[test]
    fn test_cookie_lookup() {
        let ctx = context(
            http::Request::builder()
                .uri("/")
                .header(http::header::COOKIE, "theme=dark; session=abc123"),
        );

        assert_eq!(ctx.cookie("session").map(|c| c.value().to_string()), Some("abc123".into()));
        assert!(ctx.cookie("missing").is_none());
    }

    #[test]
    fn test_extensions_carry_request_state() {
        #[derive(Clone, Debug, PartialEq)]
        struct CurrentUser(String);

        let mut ctx = context(http::Request::builder().uri("/"));
        ctx.extensions_mut().insert(CurrentUser("ana".into()));

        assert_eq!(ctx.extensions().get::<CurrentUser>(), Some(&CurrentUser("ana".into())));
    }
}
