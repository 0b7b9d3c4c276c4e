//! 模板渲染
//!
//! 分发管道只需要“用这些数据渲染这个名字的模板”的能力，即 [`Renderer`]。
//! [`TemplateEngine`] 是基于 Tera 的默认实现。
//!
//! 处理器按文件名引用模板。glob 加载的子目录模板（例如 `pages/user.html`）
//! 会再以文件名 `user.html` 注册一次；文件名重复时按路径排序先到先得。
//!
//! ## 使用示例
//!
//! ```ignore
//! let engine = TemplateEngine::new("templates/**/*.html")?;
//! let mux = Mux::new().with_renderer(Arc::new(engine));
//!
//! // 处理器中
//! response.render("user.html", &json!({ "name": "Ana" }));
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tera::Tera;
use weft_core::constants::{TEMPLATES_ERROR_TEMPLATE, TEMPLATES_PATTERN};
use weft_core::Environment;

/// 模板渲染能力
pub trait Renderer: Send + Sync {
    fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template initialization error: {0}")]
    InitError(String),

    #[error("No renderer configured for template '{0}'")]
    NoRenderer(String),

    #[error("Failed to serialize data for template '{template}': {cause}")]
    DataError { template: String, cause: String },

    #[error("Failed to render template '{template}': {cause}")]
    RenderError { template: String, cause: String },
}

/// 模板配置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateProperties {
    /// glob 模式，例如 "templates/**/*.html"；为空时不加载模板
    pub pattern: Option<String>,

    /// 出错时渲染的模板
    pub error_template: Option<String>,
}

impl TemplateProperties {
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            pattern: env.get_string(TEMPLATES_PATTERN),
            error_template: env.get_string(TEMPLATES_ERROR_TEMPLATE),
        }
    }
}

/// 基于 Tera 的模板引擎
///
/// 克隆共享同一个 Tera 实例。
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<RwLock<Tera>>,
    /// glob 的根目录，Tera 以它为基准给模板命名
    root: Option<PathBuf>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("templates", &self.template_names())
            .finish()
    }
}

impl TemplateEngine {
    /// 按 glob 模式加载模板
    pub fn new(pattern: &str) -> Result<Self, TemplateError> {
        let mut tera = Tera::new(pattern).map_err(|e| {
            TemplateError::InitError(format!(
                "Failed to initialize Tera with pattern '{}': {}",
                pattern, e
            ))
        })?;

        let root = glob_root(pattern);
        alias_base_names(&mut tera, &root)?;

        tracing::info!(pattern = %pattern, templates = tera.get_template_names().count(), "Template engine created");

        Ok(Self {
            tera: Arc::new(RwLock::new(tera)),
            root: Some(root),
        })
    }

    /// 空引擎，之后用 `add_raw_template` / `add_template_file` 添加
    pub fn empty() -> Self {
        Self::from_tera(Tera::default())
    }

    fn from_tera(tera: Tera) -> Self {
        Self {
            tera: Arc::new(RwLock::new(tera)),
            root: None,
        }
    }

    pub fn from_properties(props: &TemplateProperties) -> Result<Option<Self>, TemplateError> {
        props.pattern.as_deref().map(Self::new).transpose()
    }

    pub fn add_raw_template(&self, name: &str, content: &str) -> Result<(), TemplateError> {
        self.tera
            .write()
            .add_raw_template(name, content)
            .map_err(|e| TemplateError::InitError(format!("Template '{}': {}", name, e)))
    }

    /// 以文件名（不含目录）注册模板文件
    pub fn add_template_file(&self, path: impl AsRef<Path>) -> Result<(), TemplateError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TemplateError::InitError(format!("Invalid template path {:?}", path)))?;

        self.tera
            .write()
            .add_template_file(path, Some(name))
            .map_err(|e| TemplateError::InitError(format!("Template {:?}: {}", path, e)))
    }

    /// 从磁盘重新加载所有 glob 加载的模板
    pub fn reload(&self) -> Result<(), TemplateError> {
        let mut tera = self.tera.write();
        tera.full_reload()
            .map_err(|e| TemplateError::InitError(format!("Template reload failed: {}", e)))?;
        if let Some(root) = &self.root {
            alias_base_names(&mut tera, root)?;
        }
        tracing::info!("Templates reloaded");
        Ok(())
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tera
            .read()
            .get_template_names()
            .map(String::from)
            .collect();
        names.sort();
        names
    }
}

impl Renderer for TemplateEngine {
    fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        // 非对象的数据挂在 `data` 变量下
        let context = match data {
            Value::Object(_) => tera::Context::from_value(data.clone()).map_err(|e| {
                TemplateError::DataError {
                    template: name.to_string(),
                    cause: e.to_string(),
                }
            })?,
            other => {
                let mut context = tera::Context::new();
                context.insert("data", other);
                context
            }
        };

        self.tera
            .read()
            .render(name, &context)
            .map_err(|e| TemplateError::RenderError {
                template: name.to_string(),
                cause: error_chain(&e),
            })
    }
}

/// glob 中第一个 `*` 之前的目录
fn glob_root(pattern: &str) -> PathBuf {
    let prefix = Path::new(pattern.find('*').map_or(pattern, |i| &pattern[..i]));
    std::fs::canonicalize(prefix).unwrap_or_else(|_| prefix.to_path_buf())
}

/// 子目录中的模板再以文件名注册一次
fn alias_base_names(tera: &mut Tera, root: &Path) -> Result<(), TemplateError> {
    let mut taken: HashSet<String> = tera.get_template_names().map(String::from).collect();
    let mut nested: Vec<String> = taken.iter().filter(|n| n.contains('/')).cloned().collect();
    nested.sort();

    let mut aliases = Vec::new();
    for name in nested {
        let base = name.rsplit('/').next().unwrap_or(&name).to_string();
        if !taken.insert(base.clone()) {
            tracing::warn!(template = %name, alias = %base, "Template base name already taken");
            continue;
        }
        aliases.push((root.join(&name), Some(base)));
    }

    if aliases.is_empty() {
        return Ok(());
    }
    tera.add_template_files(aliases)
        .map_err(|e| TemplateError::InitError(format!("Template alias failed: {}", error_chain(&e))))
}

/// Tera 的错误信息藏在 source 链里
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
