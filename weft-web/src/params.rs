//! 路径参数
//!
//! 每次匹配都会新建一个 `PathParams`，请求结束时随请求上下文一起释放。

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::WebError;

/// 通配符名 -> 捕获值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    values: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// 取出参数并解析成目标类型
    ///
    /// ```ignore
    /// let id: u64 = params.parse("id")?;
    /// ```
    pub fn parse<T>(&self, name: &str) -> Result<T, WebError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(name).ok_or_else(|| WebError::PathParse {
            name: name.to_string(),
            message: "missing".to_string(),
        })?;

        raw.parse().map_err(|e: T::Err| WebError::PathParse {
            name: name.to_string(),
            message: format!("'{}': {}", raw, e),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.values
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_values() {
        let params: PathParams = [("id", "42"), ("slug", "hello")].into_iter().collect();

        assert_eq!(params.parse::<u64>("id").unwrap(), 42);
        assert_eq!(params.parse::<String>("slug").unwrap(), "hello");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_parse_errors_name_the_parameter() {
        let params: PathParams = [("id", "forty-two")].into_iter().collect();

        match params.parse::<i64>("id") {
            Err(WebError::PathParse { name, message }) => {
                assert_eq!(name, "id");
                assert!(message.contains("forty-two"));
            }
            other => panic!("Expected PathParse error, got {:?}", other),
        }

        assert!(matches!(
            params.parse::<i64>("missing"),
            Err(WebError::PathParse { .. })
        ));
    }
}
