//! Tag expressions
//!
//! Used both to select scenarios before partitioning and to scope retries.
//! Grammar: `|` (or) binds loosest, then `&` or `,` (and), then `!` (not);
//! parentheses group. Tag names compare case-insensitively.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    Tag(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Tag(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, tags: &HashSet<String>) -> bool {
        match self {
            Node::Tag(t) => tags.contains(t),
            Node::Not(n) => !n.eval(tags),
            Node::And(a, b) => a.eval(tags) && b.eval(tags),
            Node::Or(a, b) => a.eval(tags) || b.eval(tags),
        }
    }
}

/// Parsed tag expression
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagExpr {
    source: String,
    root: Node,
}

impl TagExpr {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTagExpression(source.to_string(), reason.to_string());

        let tokens = tokenize(source);
        if tokens.is_empty() {
            return Err(invalid("expression is empty"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.or().map_err(|e| invalid(&e))?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid("unexpected trailing input"));
        }

        Ok(Self {
            source: source.trim().to_string(),
            root,
        })
    }

    /// Whether the given tags satisfy the expression
    pub fn matches<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: HashSet<String> = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .collect();
        self.root.eval(&tags)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for TagExpr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagExpr {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagExpr> for String {
    fn from(expr: TagExpr) -> Self {
        expr.source
    }
}

impl fmt::Display for TagExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        let tag = current.trim();
        if !tag.is_empty() {
            tokens.push(Token::Tag(tag.to_lowercase()));
        }
        current.clear();
    };

    for c in source.chars() {
        let op = match c {
            '&' | ',' => Some(Token::And),
            '|' => Some(Token::Or),
            '!' => Some(Token::Not),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        match op {
            Some(token) => {
                flush(&mut current, &mut tokens);
                tokens.push(token);
            }
            None => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Node, String> {
        let mut node = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            node = Node::Or(Box::new(node), Box::new(self.and()?));
        }
        Ok(node)
    }

    fn and(&mut self) -> Result<Node, String> {
        let mut node = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            node = Node::And(Box::new(node), Box::new(self.unary()?));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::Not) => Ok(Node::Not(Box::new(self.unary()?))),
            Some(Token::Open) => {
                let node = self.or()?;
                match self.next() {
                    Some(Token::Close) => Ok(node),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Tag(t)) => Ok(Node::Tag(t)),
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
