//! 路径分词
//!
//! 路径按 `/` 切分成段，`{name}` 形式的段是命名通配符，其余段按原样作为字面量。
//! 不做大小写归一化，也不做百分号解码。

use std::fmt;

/// 路径段
///
/// 字典树查找只关心“是不是通配符”，通配符的名字只是捕获参数时用的载荷，
/// 所以两个名字不同的通配符彼此相等。
#[derive(Debug, Clone, Eq)]
pub enum Token {
    Literal(String),
    Wildcard(String),
}

impl Token {
    pub fn parse(segment: &str) -> Self {
        match wildcard_name(segment) {
            Some(name) => Token::Wildcard(name.to_string()),
            None => Token::Literal(segment.to_string()),
        }
    }

    /// 通配符的参数名，字面量返回 `None`
    pub fn wildcard_name(&self) -> Option<&str> {
        match self {
            Token::Wildcard(name) => Some(name),
            Token::Literal(_) => None,
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Literal(a), Token::Literal(b)) => a == b,
            (Token::Wildcard(_), Token::Wildcard(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => f.write_str(s),
            Token::Wildcard(name) => write!(f, "{{{}}}", name),
        }
    }
}

/// `{name}` 且名字非空时返回名字
fn wildcard_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// 把路径切成原始段
///
/// 去掉一个开头的 `/` 和一个结尾的 `/`。根路径 `/` 和空路径都不产生任何段，
/// 对应字典树的根节点。
pub fn segments(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);

    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

pub fn tokenize(path: &str) -> Vec<Token> {
    segments(path).into_iter().map(Token::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_wildcard_segments() {
        assert_eq!(
            tokenize("/um/dois/{tres}/quatro"),
            vec![
                Token::Literal("um".into()),
                Token::Literal("dois".into()),
                Token::Wildcard("tres".into()),
                Token::Literal("quatro".into()),
            ]
        );
        assert_eq!(tokenize("/find/{param}")[1].wildcard_name(), Some("param"));
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        assert_eq!(tokenize("/test/"), tokenize("/test"));
        assert_eq!(segments("/a/b/"), vec!["a", "b"]);
    }

    #[test]
    fn test_root_path() {
        assert!(segments("/").is_empty());
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_no_normalization() {
        assert_eq!(segments("/A//b%20c"), vec!["A", "", "b%20c"]);
        assert_ne!(tokenize("/Test"), tokenize("/test"));
    }

    #[test]
    fn test_wildcard_identity_ignores_name() {
        assert_eq!(Token::parse("{x}"), Token::parse("{y}"));
        assert_ne!(Token::parse("{x}"), Token::parse("x"));
        // 空名字不是通配符
        assert_eq!(Token::parse("{}"), Token::Literal("{}".into()));
        assert_eq!(Token::parse("{id}").to_string(), "{id}");
    }
}
