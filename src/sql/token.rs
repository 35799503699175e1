//! SQL tokenizer
//!
//! Splits a statement into kind-tagged tokens and arranges them into a tree
//! of parenthesized groups and WHERE clauses. Runs of whitespace (and
//! comments) collapse to a single space, so the text rendered back from any
//! token span is canonical and stable.

use crate::error::{Error, Result};

/// Lexical class of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Reserved SQL word
    Keyword,
    /// Bare or quoted identifier (quoted identifiers keep their quotes)
    Name,
    /// Comparison or arithmetic operator
    Operator,
    /// Parenthesis, comma, semicolon, dot
    Punctuation,
    /// String or numeric literal (string literals keep their quotes)
    Literal,
    /// Canonicalized run of whitespace
    Whitespace,
}

/// A single lexical token with its canonical source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// True for the boolean connectives `AND`/`OR`
    pub fn is_connective(&self) -> bool {
        self.kind == TokenKind::Keyword
            && (self.text.eq_ignore_ascii_case("and") || self.text.eq_ignore_ascii_case("or"))
    }

    fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }

    fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == text
    }
}

/// Kind of a token group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Parenthesized sub-expression, parens included
    Paren,
    /// WHERE clause, the `WHERE` keyword included
    Where,
}

/// A nested group of tokens
#[derive(Debug, Clone)]
pub struct Group {
    pub kind: GroupKind,
    pub nodes: Vec<Node>,
}

/// A node of the statement tree
#[derive(Debug, Clone)]
pub enum Node {
    Token(Token),
    Group(Group),
}

/// A tokenized SQL statement
#[derive(Debug, Clone)]
pub struct Statement {
    pub nodes: Vec<Node>,
}

impl Statement {
    /// Render the whole statement back to canonical text
    pub fn canonical(&self) -> String {
        render_nodes(&self.nodes)
    }

    /// All WHERE-clause groups, depth-first in document order
    pub fn where_clauses(&self) -> Vec<&Group> {
        let mut out = Vec::new();
        collect_wheres(&self.nodes, &mut out);
        out
    }
}

const KEYWORDS: &[&str] = &[
    "select", "from", "where", "and", "or", "not", "in", "is", "null", "like", "ilike", "between",
    "group", "by", "order", "having", "limit", "offset", "union", "intersect", "except", "all",
    "distinct", "as", "on", "join", "inner", "left", "right", "outer", "full", "cross", "case",
    "when", "then", "else", "end", "exists", "asc", "desc", "cast", "true", "false", "insert",
    "into", "update", "delete", "create", "table", "values",
];

/// Keywords that terminate a WHERE clause
const CLAUSE_TERMINATORS: &[&str] = &[
    "group", "order", "having", "limit", "offset", "union", "intersect", "except", "returning",
];

fn is_keyword_text(word: &str) -> bool {
    KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// Tokenize a statement into a flat, canonicalized token sequence
pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut pending_ws = false;
    let mut i = 0;

    // push a token, materializing at most one space for any preceding
    // whitespace/comment run
    let push = |tokens: &mut Vec<Token>, pending_ws: &mut bool, token: Token| {
        if *pending_ws && !tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Whitespace, " "));
        }
        *pending_ws = false;
        tokens.push(token);
    };

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            pending_ws = true;
            i += 1;
            continue;
        }

        // line comment
        if ch == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            pending_ws = true;
            continue;
        }

        // block comment
        if ch == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            if i >= chars.len() {
                return Err(Error::Sql("unterminated block comment".to_string()));
            }
            i += 2;
            pending_ws = true;
            continue;
        }

        // string literal, '' escapes a quote
        if ch == '\'' {
            let mut text = String::from('\'');
            i += 1;
            loop {
                match chars.get(i) {
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        text.push_str("''");
                        i += 2;
                    }
                    Some('\'') => {
                        text.push('\'');
                        i += 1;
                        break;
                    }
                    Some(c) => {
                        text.push(*c);
                        i += 1;
                    }
                    None => return Err(Error::Sql("unterminated string literal".to_string())),
                }
            }
            push(&mut tokens, &mut pending_ws, Token::new(TokenKind::Literal, text));
            continue;
        }

        // quoted identifier; quotes stay part of the token text, so a quoted
        // name never equals a bare column name
        if ch == '"' {
            let mut text = String::from('"');
            i += 1;
            loop {
                match chars.get(i) {
                    Some('"') => {
                        text.push('"');
                        i += 1;
                        break;
                    }
                    Some(c) => {
                        text.push(*c);
                        i += 1;
                    }
                    None => return Err(Error::Sql("unterminated quoted identifier".to_string())),
                }
            }
            push(&mut tokens, &mut pending_ws, Token::new(TokenKind::Name, text));
            continue;
        }

        // bare identifier or keyword
        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut text = String::new();
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                text.push(chars[i]);
                i += 1;
            }
            let kind = if is_keyword_text(&text) {
                TokenKind::Keyword
            } else {
                TokenKind::Name
            };
            push(&mut tokens, &mut pending_ws, Token::new(kind, text));
            continue;
        }

        // numeric literal
        if ch.is_ascii_digit() {
            let mut text = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                text.push(chars[i]);
                i += 1;
            }
            if i < chars.len()
                && chars[i] == '.'
                && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
            {
                text.push('.');
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    text.push(chars[i]);
                    i += 1;
                }
            }
            push(&mut tokens, &mut pending_ws, Token::new(TokenKind::Literal, text));
            continue;
        }

        // multi-char operators first
        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if matches!(two.as_str(), ">=" | "<=" | "<>" | "!=" | "::" | "||") {
            push(&mut tokens, &mut pending_ws, Token::new(TokenKind::Operator, two));
            i += 2;
            continue;
        }

        let token = match ch {
            '(' | ')' | ',' | ';' | '.' => Token::new(TokenKind::Punctuation, ch.to_string()),
            '=' | '<' | '>' | '+' | '-' | '*' | '/' | '%' => {
                Token::new(TokenKind::Operator, ch.to_string())
            }
            other => Token::new(TokenKind::Punctuation, other.to_string()),
        };
        push(&mut tokens, &mut pending_ws, token);
        i += 1;
    }

    Ok(tokens)
}

/// Tokenize a statement and arrange it into a group tree
pub fn parse(sql: &str) -> Result<Statement> {
    let tokens = tokenize(sql)?;
    let mut builder = TreeBuilder { tokens, pos: 0 };
    let nodes = builder.parse_nodes(false);
    Ok(Statement { nodes })
}

struct TreeBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl TreeBuilder {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn parse_nodes(&mut self, in_paren: bool) -> Vec<Node> {
        let mut nodes = Vec::new();
        while let Some(token) = self.peek() {
            if in_paren && token.is_punct(")") {
                break;
            }
            if token.is_punct("(") {
                nodes.push(Node::Group(self.parse_paren()));
            } else if token.is_keyword("where") {
                nodes.push(Node::Group(self.parse_where(in_paren)));
            } else {
                nodes.push(Node::Token(self.advance()));
            }
        }
        nodes
    }

    fn parse_paren(&mut self) -> Group {
        let mut nodes = vec![Node::Token(self.advance())];
        nodes.extend(self.parse_nodes(true));
        if self.peek().is_some_and(|t| t.is_punct(")")) {
            nodes.push(Node::Token(self.advance()));
        }
        Group {
            kind: GroupKind::Paren,
            nodes,
        }
    }

    fn parse_where(&mut self, in_paren: bool) -> Group {
        let mut nodes = vec![Node::Token(self.advance())];
        while let Some(token) = self.peek() {
            if in_paren && token.is_punct(")") {
                break;
            }
            if token.is_punct(";") {
                break;
            }
            if token.kind == TokenKind::Keyword
                && CLAUSE_TERMINATORS
                    .iter()
                    .any(|k| token.text.eq_ignore_ascii_case(k))
            {
                break;
            }
            if token.is_punct("(") {
                nodes.push(Node::Group(self.parse_paren()));
            } else {
                nodes.push(Node::Token(self.advance()));
            }
        }
        Group {
            kind: GroupKind::Where,
            nodes,
        }
    }
}

fn collect_wheres<'a>(nodes: &'a [Node], out: &mut Vec<&'a Group>) {
    for node in nodes {
        if let Node::Group(group) = node {
            if group.kind == GroupKind::Where {
                out.push(group);
            }
            collect_wheres(&group.nodes, out);
        }
    }
}

/// Render a node slice back to canonical text
pub fn render_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Token(token) => out.push_str(&token.text),
            Node::Group(group) => out.push_str(&render_nodes(&group.nodes)),
        }
    }
    out
}

/// Flatten a group to a linear token sequence, descending into parenthesized
/// sub-expressions but skipping nested WHERE clauses: each nested clause is
/// scanned on its own visit, so a time reference belongs to exactly one clause.
pub fn flatten_clause<'a>(group: &'a Group, out: &mut Vec<&'a Token>) {
    for node in &group.nodes {
        match node {
            Node::Token(token) => out.push(token),
            Node::Group(inner) if inner.kind != GroupKind::Where => flatten_clause(inner, out),
            Node::Group(_) => {}
        }
    }
}
