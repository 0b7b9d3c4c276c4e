use thiserror::Error;

/// weft-core 的错误类型
///
/// 配置加载和日志初始化的失败都归到这里，
/// 其他错误通过 `Other` 携带 anyhow 上下文。
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to read config file {path}: {cause}")]
    ConfigRead { path: String, cause: String },

    #[error("Failed to parse config '{name}': {cause}")]
    ConfigParse { name: String, cause: String },

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
