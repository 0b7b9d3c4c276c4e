//! 路由字典树
//!
//! 每个节点要么只有字面量子节点，要么只有一个通配符子节点，两者互斥。
//! 因此匹配时不存在“字面量和通配符谁优先”的问题：节点上有通配符子节点就走通配符，
//! 否则按字面量精确查找。
//!
//! 注册是全有或全无的：先只读地校验整条路径，全部通过后才创建节点。

use std::collections::HashMap;

use thiserror::Error;

use crate::params::PathParams;
use crate::token::{segments, tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Route already exists")]
    RouteAlreadyExists,

    #[error("Wildcard node cannot have siblings")]
    WildcardConflict,

    #[error("Route not found")]
    RouteNotFound,
}

/// 一次成功匹配的结果
///
/// `record` 是注册记录的副本，注册时的原件不会被匹配修改。
#[derive(Debug, Clone)]
pub struct RouteMatch<T> {
    pub record: T,
    pub params: PathParams,
    /// 前缀路由未被消费的路径剩余部分（原样，以 `/` 连接），其他情况为空
    pub remainder: String,
}

#[derive(Debug)]
struct Entry<T> {
    record: T,
    prefix: bool,
}

#[derive(Debug)]
struct WildcardChild<T> {
    name: String,
    node: Node<T>,
}

#[derive(Debug)]
struct Node<T> {
    literals: HashMap<String, Node<T>>,
    wildcard: Option<Box<WildcardChild<T>>>,
    entry: Option<Entry<T>>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            literals: HashMap::new(),
            wildcard: None,
            entry: None,
        }
    }

    /// 注册路径上的一步
    ///
    /// `Ok(Some)` 沿已有子节点前进，`Ok(None)` 表示这里可以新建子节点，
    /// `Err` 表示新建会破坏字面量/通配符互斥。
    fn existing_child(&self, token: &Token) -> Result<Option<&Node<T>>, RouteError> {
        match token {
            Token::Literal(segment) => {
                if self.wildcard.is_some() {
                    return Err(RouteError::WildcardConflict);
                }
                Ok(self.literals.get(segment))
            }
            Token::Wildcard(name) => match &self.wildcard {
                Some(child) if child.name == *name => Ok(Some(&child.node)),
                // 同一位置换了名字的通配符算冲突，不算新分支
                Some(_) => Err(RouteError::WildcardConflict),
                None if !self.literals.is_empty() => Err(RouteError::WildcardConflict),
                None => Ok(None),
            },
        }
    }

    fn child_or_insert(&mut self, token: Token) -> &mut Node<T> {
        match token {
            Token::Literal(segment) => self.literals.entry(segment).or_insert_with(Node::new),
            Token::Wildcard(name) => {
                &mut self
                    .wildcard
                    .get_or_insert_with(|| {
                        Box::new(WildcardChild {
                            name,
                            node: Node::new(),
                        })
                    })
                    .node
            }
        }
    }
}

/// 路由器，独占整棵树
///
/// 本身不加锁；与请求并发使用时由持有者套一把读写锁（见 `Mux`）。
#[derive(Debug)]
pub struct Router<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self {
            root: Node::new(),
            len: 0,
        }
    }

    /// 已注册的路由数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn append_route(&mut self, path: &str, record: T) -> Result<(), RouteError> {
        self.insert(path, record, false)
    }

    /// 注册前缀路由：更深的路径匹配失败时回退到这里，剩余路径作为 `remainder`
    pub fn append_prefix_route(&mut self, path: &str, record: T) -> Result<(), RouteError> {
        self.insert(path, record, true)
    }

    fn insert(&mut self, path: &str, record: T, prefix: bool) -> Result<(), RouteError> {
        let tokens = tokenize(path);
        self.validate(&tokens)?;

        let mut node = &mut self.root;
        for token in tokens {
            node = node.child_or_insert(token);
        }

        node.entry = Some(Entry { record, prefix });
        self.len += 1;
        Ok(())
    }

    /// 沿最长已有前缀走下去，剩下的第一个 token 必须能挂在停下的节点上。
    /// 之后的 token 都挂在新节点上，不可能冲突。
    fn validate(&self, tokens: &[Token]) -> Result<(), RouteError> {
        let mut node = &self.root;
        for token in tokens {
            match node.existing_child(token)? {
                Some(child) => node = child,
                None => return Ok(()),
            }
        }

        if node.entry.is_some() {
            return Err(RouteError::RouteAlreadyExists);
        }
        Ok(())
    }
}

impl<T: Clone> Router<T> {
    pub fn find(&self, path: &str) -> Result<RouteMatch<T>, RouteError> {
        let segments = segments(path);
        let mut captured: Vec<(&str, &str)> = Vec::new();

        // 最近一个带前缀记录的祖先：(记录, 深度, 当时已捕获的参数个数)
        let mut fallback = self
            .root
            .entry
            .as_ref()
            .filter(|e| e.prefix)
            .map(|e| (e, 0, 0));

        let mut node = &self.root;
        let mut depth = 0;
        for segment in &segments {
            let next = if let Some(wildcard) = &node.wildcard {
                captured.push((wildcard.name.as_str(), *segment));
                Some(&wildcard.node)
            } else {
                node.literals.get(*segment)
            };

            let Some(next) = next else {
                break;
            };
            node = next;
            depth += 1;

            if let Some(entry) = node.entry.as_ref().filter(|e| e.prefix) {
                fallback = Some((entry, depth, captured.len()));
            }
        }

        // 走完全部段：只看停下的节点，不回退
        if depth == segments.len() {
            return match &node.entry {
                Some(entry) => Ok(RouteMatch {
                    record: entry.record.clone(),
                    params: captured.into_iter().collect(),
                    remainder: String::new(),
                }),
                None => Err(RouteError::RouteNotFound),
            };
        }

        match fallback {
            Some((entry, depth, params)) => Ok(RouteMatch {
                record: entry.record.clone(),
                params: captured.into_iter().take(params).collect(),
                remainder: segments[depth..].join("/"),
            }),
            None => Err(RouteError::RouteNotFound),
        }
    }
}
