// weft-core: weft 的公共基础设施
//
// 提供：
// - 分层配置（TOML 文件、环境变量、内存配置源）
// - 基于 tracing-subscriber 的日志初始化
// - 共享错误类型

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{CoreError, CoreResult};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::constants::*;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
}
