//! 配置键常量定义
//!
//! 所有 weft 组件读取的配置键都集中在这里

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 请求体最大字节数
pub const SERVER_MAX_BODY_SIZE: &str = "server.max-body-size";

// ==================== 模板配置 ====================

/// 模板 glob 模式，例如 "templates/**/*.html"
pub const TEMPLATES_PATTERN: &str = "weft.templates.pattern";

/// 出错时渲染的模板名称
pub const TEMPLATES_ERROR_TEMPLATE: &str = "weft.templates.error-template";

// ==================== 日志配置 ====================

pub const LOGGING_LEVEL: &str = "logging.level";

pub const LOGGING_FORMAT: &str = "logging.format";

pub const LOGGING_FILTER: &str = "logging.filter";

/// 环境变量配置源的默认前缀
pub const ENV_PREFIX: &str = "WEFT_";
