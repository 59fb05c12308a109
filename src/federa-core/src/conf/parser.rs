//! Tokenizer and parser for the nested configuration format.

use std::path::{Path, PathBuf};

use log::debug;

use common_error::{FederaError, FederaResult};

use super::node::ConfigNode;

/// Maximum nesting of `%include` directives.
pub const MAX_INCLUDE_DEPTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Key(String),
    Str(String),
    Open,
    Close,
    Include,
}

#[derive(Debug)]
struct Lexed {
    token: Token,
    line: usize,
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ';' | '\u{a0}' | '\u{feff}')
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn syntax_error(source: &str, line: usize, msg: impl AsRef<str>) -> FederaError {
    FederaError::syntax(format!("{source}:{line}: {}", msg.as_ref()))
}

fn tokenize(source: &str, text: &str) -> FederaResult<Vec<Lexed>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        if c == '\n' {
            line += 1;
            chars.next();
        } else if is_separator(c) {
            chars.next();
        } else if c == '#' {
            while let Some(&c) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
        } else if c == '(' {
            chars.next();
            tokens.push(Lexed { token: Token::Open, line });
        } else if c == ')' {
            chars.next();
            tokens.push(Lexed { token: Token::Close, line });
        } else if c == '"' || c == '\'' {
            let start = line;
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    None => return Err(syntax_error(source, start, "unterminated string")),
                    Some(d) if d == c => {
                        if chars.peek() == Some(&c) {
                            chars.next();
                            value.push(c);
                        } else {
                            break;
                        }
                    }
                    Some('%') => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('%') => value.push('%'),
                        Some('u') => {
                            let hex: String = chars.by_ref().take(4).collect();
                            let decoded = u32::from_str_radix(&hex, 16)
                                .ok()
                                .filter(|_| hex.len() == 4)
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    syntax_error(source, line, format!("bad escape %u{hex}"))
                                })?;
                            value.push(decoded);
                        }
                        other => {
                            return Err(syntax_error(
                                source,
                                line,
                                format!("bad escape %{}", other.map(String::from).unwrap_or_default()),
                            ));
                        }
                    },
                    Some(d) => {
                        if d == '\n' {
                            line += 1;
                        }
                        value.push(d);
                    }
                }
            }
            tokens.push(Lexed { token: Token::Str(value), line: start });
        } else if c == '%' {
            let directive: String = chars.by_ref().take(8).collect();
            if directive != "%include" {
                return Err(syntax_error(source, line, format!("unknown directive {directive}")));
            }
            tokens.push(Lexed { token: Token::Include, line });
        } else if is_key_start(c) {
            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if !is_key_char(c) {
                    break;
                }
                key.push(c);
                chars.next();
            }
            tokens.push(Lexed { token: Token::Key(key), line });
        } else {
            return Err(syntax_error(source, line, format!("unexpected character '{c}'")));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: String,
    tokens: Vec<Lexed>,
    pos: usize,
    base_dir: Option<&'a Path>,
    depth: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<&Lexed> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map_or(1, |t| t.line)
    }

    fn parse_items(&mut self, nested: bool) -> FederaResult<Vec<ConfigNode>> {
        let mut items = Vec::new();
        loop {
            let Some(lexed) = self.next() else {
                if nested {
                    return Err(syntax_error(&self.source, self.last_line(), "missing ')'"));
                }
                return Ok(items);
            };
            let line = lexed.line;
            match lexed.token.clone() {
                Token::Close if nested => return Ok(items),
                Token::Close => return Err(syntax_error(&self.source, line, "unmatched ')'")),
                Token::Str(value) => items.push(ConfigNode::new(value)),
                Token::Open => {
                    let children = self.parse_items(true)?;
                    items.push(ConfigNode::with_children("", children));
                }
                Token::Key(key) => match self.next().map(|l| l.token.clone()) {
                    Some(Token::Str(value)) => {
                        items.push(ConfigNode::with_children(key, vec![ConfigNode::new(value)]));
                    }
                    Some(Token::Open) => {
                        let children = self.parse_items(true)?;
                        items.push(ConfigNode::with_children(key, children));
                    }
                    _ => {
                        return Err(syntax_error(
                            &self.source,
                            line,
                            format!("key {key} must be followed by a string or '('"),
                        ));
                    }
                },
                Token::Include => match self.next().map(|l| l.token.clone()) {
                    Some(Token::Str(path)) => items.extend(self.include(&path, line)?),
                    _ => return Err(syntax_error(&self.source, line, "%include needs a path")),
                },
            }
        }
    }

    fn include(&self, path: &str, line: usize) -> FederaResult<Vec<ConfigNode>> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(syntax_error(&self.source, line, "%include nested too deeply"));
        }
        let resolved: PathBuf = match self.base_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        };
        debug!("including {}", resolved.display());
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            syntax_error(&self.source, line, format!("cannot include {}: {e}", resolved.display()))
        })?;
        let root = parse_nested(
            &resolved.display().to_string(),
            &text,
            resolved.parent(),
            self.depth + 1,
        )?;
        Ok(root.children().to_vec())
    }
}

fn parse_nested(
    name: &str,
    text: &str,
    base_dir: Option<&Path>,
    depth: usize,
) -> FederaResult<ConfigNode> {
    let tokens = tokenize(name, text)?;
    let mut parser = Parser {
        source: name.to_string(),
        tokens,
        pos: 0,
        base_dir,
        depth,
    };
    let children = parser.parse_items(false)?;
    Ok(ConfigNode::with_children(name, children))
}

/// Parse configuration text into a root node named `name`.
pub fn parse_str(name: &str, text: &str, base_dir: Option<&Path>) -> FederaResult<ConfigNode> {
    parse_nested(name, text, base_dir, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> FederaResult<ConfigNode> {
        parse_str("test", text, None)
    }

    #[test]
    fn test_key_value_and_lists() {
        let root = parse(r#"NAME "x", L("a"; 'b') (U "1")"#).unwrap();
        assert_eq!(root.count(), 3);
        assert_eq!(root.children()[0].name(), "NAME");
        assert_eq!(root.children()[0].to_string(), "x");
        assert_eq!(root.children()[1].count(), 2);
        assert_eq!(root.children()[2].name(), "");
    }

    #[test]
    fn test_string_escapes() {
        let root = parse(r#"V "a""b%n%%%u00e4" W 'it''s'"#).unwrap();
        assert_eq!(root.get("V").unwrap().to_string(), "a\"b\n%\u{e4}");
        assert_eq!(root.get("W").unwrap().to_string(), "it's");
    }

    #[test]
    fn test_comments_and_separators() {
        let root = parse("# header\nA(\"1\",\"2\") # trailing\n\u{feff}B \"3\"").unwrap();
        assert_eq!(root.get("A").unwrap().count(), 2);
        assert_eq!(root.get("B").unwrap().to_string(), "3");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse("A(\"1\""), Err(FederaError::SyntaxError(_))));
        assert!(matches!(parse("A \"1\")"), Err(FederaError::SyntaxError(_))));
        assert!(matches!(parse("A B"), Err(FederaError::SyntaxError(_))));
        assert!(matches!(parse("\"open"), Err(FederaError::SyntaxError(_))));
        assert!(matches!(parse("V \"%x\""), Err(FederaError::SyntaxError(_))));
        assert!(matches!(parse("V \"%u12\""), Err(FederaError::SyntaxError(_))));
    }

    #[test]
    fn test_error_names_line() {
        let err = parse("A \"1\"\nB C").unwrap_err().to_string();
        assert!(err.contains("test:2"), "{err}");
    }

    #[test]
    fn test_include_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inner.conf"), "INNER \"yes\"").unwrap();
        std::fs::write(
            dir.path().join("outer.conf"),
            "OUTER(%include \"inner.conf\")",
        )
        .unwrap();

        let root = ConfigNode::from_file(&dir.path().join("outer.conf")).unwrap();
        assert_eq!(root.get("OUTER").unwrap().get("INNER").unwrap().to_string(), "yes");
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loop.conf"), "%include \"loop.conf\"").unwrap();
        let err = ConfigNode::from_file(&dir.path().join("loop.conf")).unwrap_err();
        assert!(matches!(err, FederaError::SyntaxError(_)));
    }
}
