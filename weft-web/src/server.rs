//! Web 服务器模块
//!
//! 把 [`Mux`] 挂到 axum 上并监听端口

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use weft_core::constants::{SERVER_HOST, SERVER_MAX_BODY_SIZE, SERVER_PORT};
use weft_core::Environment;

use crate::mux::Mux;

/// 默认请求体上限 2 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 请求体最大字节数
    pub max_body_size: usize,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置，缺失或越界的值使用默认值
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string_or(SERVER_HOST, &defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(defaults.port),
            max_body_size: env
                .get_i64(SERVER_MAX_BODY_SIZE)
                .and_then(|size| usize::try_from(size).ok())
                .unwrap_or(defaults.max_body_size),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Weft Web 服务器
pub struct WebServer {
    /// 服务器配置
    config: ServerProperties,

    mux: Arc<Mux>,
}

impl WebServer {
    pub fn new(config: ServerProperties, mux: Mux) -> Self {
        let mux = mux.with_max_body_size(config.max_body_size);
        Self {
            config,
            mux: Arc::new(mux),
        }
    }

    pub fn config(&self) -> &ServerProperties {
        &self.config
    }

    /// 启动服务器，直到进程退出
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// 启动服务器，`signal` 完成时优雅退出
    pub async fn run_with_shutdown<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.address();

        let app = self.mux.router().layer(TraceLayer::new_for_http());

        tracing::info!("Starting Weft web server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .context("Server error")?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::config::MapPropertySource;

    #[test]
    fn test_defaults() {
        let props = ServerProperties::from_environment(&Environment::new());
        assert_eq!(props, ServerProperties::default());
        assert_eq!(props.address(), "0.0.0.0:8080");
        assert_eq!(props.max_body_size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(SERVER_HOST, "127.0.0.1")
                .with_property(SERVER_PORT, 3000i64)
                .with_property(SERVER_MAX_BODY_SIZE, 1024i64),
        ));

        let props = ServerProperties::from_environment(&env);
        assert_eq!(props.address(), "127.0.0.1:3000");
        assert_eq!(props.max_body_size, 1024);
    }

    #[test]
    fn test_out_of_range_port_falls_back() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test").with_property(SERVER_PORT, 70000i64),
        ));

        assert_eq!(ServerProperties::from_environment(&env).port, 8080);
    }
}
