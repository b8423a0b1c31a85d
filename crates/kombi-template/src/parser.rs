//! Tokeniser and recursive-descent parser for the template language.
//!
//! Top level text is a sequence of [`Node`]s. Inside parentheses the text is
//! split on whitespace into [`Word`]s; each word is itself a sequence of
//! nodes that are evaluated and concatenated.

use crate::error::{Result, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(String),
    Var(String),
    Token(String),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Word {
    pub parts: Vec<Node>,
}

impl Word {
    /// The literal text of a word made of a single literal part.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Node::Literal(text)] => Some(text),
            _ => None,
        }
    }

    fn as_token(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Node::Token(name)] => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub words: Vec<Word>,
    pub assign: Option<String>,
}

impl Call {
    /// Whether the words form `operand op operand [op operand ...]`.
    pub fn is_arithmetic(&self) -> bool {
        self.words.len() >= 3
            && self.words.len() % 2 == 1
            && self
                .words
                .iter()
                .skip(1)
                .step_by(2)
                .all(|w| w.as_literal().and_then(operator).is_some())
    }
}

pub(crate) fn operator(text: &str) -> Option<char> {
    match text {
        "+" => Some('+'),
        "-" => Some('-'),
        "*" => Some('*'),
        "/" => Some('/'),
        _ => None,
    }
}

pub(crate) fn parse(source: &str) -> Result<Vec<Node>> {
    let mut parser = Parser {
        source,
        chars: source.chars().collect(),
        pos: 0,
    };
    parser.parse_top()
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ':')
}

fn flush(literal: &mut String, into: &mut Vec<Node>) {
    if !literal.is_empty() {
        into.push(Node::Literal(std::mem::take(literal)));
    }
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn malformed(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::malformed(self.source, message)
    }

    /// Try `{name}` / `<name>` at the current position (which holds `open`).
    /// Returns the name and advances past the closing delimiter on success.
    fn try_reference(&mut self, close: char) -> Option<String> {
        let start = self.pos + 1;
        let mut end = start;
        while let Some(&c) = self.chars.get(end) {
            if c == close {
                break;
            }
            if !is_name_char(c) {
                return None;
            }
            end += 1;
        }
        if end == start || self.chars.get(end) != Some(&close) {
            return None;
        }
        self.pos = end + 1;
        Some(self.chars[start..end].iter().collect())
    }

    /// Index of the quote closing the one at the current position.
    fn closing_quote(&self) -> Option<usize> {
        (self.pos + 1..self.chars.len()).find(|&i| self.chars[i] == '\'')
    }

    fn parse_top(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            match c {
                '{' => match self.try_reference('}') {
                    Some(name) => {
                        flush(&mut literal, &mut nodes);
                        nodes.push(Node::Var(name));
                    }
                    None => {
                        literal.push(c);
                        self.pos += 1;
                    }
                },
                '<' => match self.try_reference('>') {
                    Some(name) => {
                        flush(&mut literal, &mut nodes);
                        nodes.push(Node::Token(name));
                    }
                    None => {
                        literal.push(c);
                        self.pos += 1;
                    }
                },
                '(' => {
                    flush(&mut literal, &mut nodes);
                    self.pos += 1;
                    nodes.push(Node::Call(self.parse_call()?));
                }
                '\'' => match self.closing_quote() {
                    // quoted runs are kept verbatim at top level
                    Some(end) => {
                        literal.extend(&self.chars[self.pos..=end]);
                        self.pos = end + 1;
                    }
                    None => {
                        literal.push(c);
                        self.pos += 1;
                    }
                },
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }
        flush(&mut literal, &mut nodes);
        Ok(nodes)
    }

    /// Parse the inside of a call; the opening parenthesis is consumed.
    fn parse_call(&mut self) -> Result<Call> {
        let mut words: Vec<Word> = Vec::new();
        let mut current = Word::default();
        let mut literal = String::new();
        let mut started = false;

        loop {
            let Some(c) = self.peek() else {
                return Err(self.malformed("unbalanced parenthesis"));
            };
            match c {
                ')' => {
                    self.pos += 1;
                    flush(&mut literal, &mut current.parts);
                    if started {
                        words.push(std::mem::take(&mut current));
                    }
                    break;
                }
                c if c.is_whitespace() => {
                    self.pos += 1;
                    flush(&mut literal, &mut current.parts);
                    if started {
                        words.push(std::mem::take(&mut current));
                        started = false;
                    }
                }
                '(' => {
                    self.pos += 1;
                    flush(&mut literal, &mut current.parts);
                    current.parts.push(Node::Call(self.parse_call()?));
                    started = true;
                }
                '{' | '<' => {
                    let close = if c == '{' { '}' } else { '>' };
                    match self.try_reference(close) {
                        Some(name) => {
                            flush(&mut literal, &mut current.parts);
                            current.parts.push(if c == '{' {
                                Node::Var(name)
                            } else {
                                Node::Token(name)
                            });
                        }
                        None => {
                            literal.push(c);
                            self.pos += 1;
                        }
                    }
                    started = true;
                }
                '\'' => {
                    let end = self
                        .closing_quote()
                        .ok_or_else(|| self.malformed("unterminated quote"))?;
                    literal.extend(&self.chars[self.pos + 1..end]);
                    self.pos = end + 1;
                    started = true;
                }
                _ => {
                    literal.push(c);
                    self.pos += 1;
                    started = true;
                }
            }
        }

        if words.is_empty() {
            return Err(self.malformed("empty expression"));
        }

        let mut assign = None;
        let n = words.len();
        if n >= 3 && words[n - 2].as_literal() == Some("as") {
            if let Some(token) = words[n - 1].as_token() {
                assign = Some(token.to_string());
                words.truncate(n - 2);
            }
        }

        Ok(Call { words, assign })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Node {
        Node::Literal(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse("/a/b.exr").unwrap(), vec![lit("/a/b.exr")]);
    }

    #[test]
    fn test_references() {
        let nodes = parse("{name}.<tok>.ext").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Var("name".into()),
                lit("."),
                Node::Token("tok".into()),
                lit(".ext"),
            ]
        );
    }

    #[test]
    fn test_non_reference_braces_are_literal() {
        assert_eq!(parse("a{b c}d<").unwrap(), vec![lit("a{b c}d<")]);
    }

    #[test]
    fn test_call_with_assignment() {
        let nodes = parse("({x} + 10 as <r>)").unwrap();
        let Node::Call(call) = &nodes[0] else {
            panic!("expected call");
        };
        assert_eq!(call.assign.as_deref(), Some("r"));
        assert_eq!(call.words.len(), 3);
        assert!(call.is_arithmetic());
    }

    #[test]
    fn test_nested_call_and_quotes() {
        let nodes = parse("(pad (sum {frame} 1) 4)_'(x)'").unwrap();
        let Node::Call(call) = &nodes[0] else {
            panic!("expected call");
        };
        assert_eq!(call.words[0].as_literal(), Some("pad"));
        assert!(matches!(call.words[1].parts[0], Node::Call(_)));
        assert_eq!(nodes[1], lit("_'(x)'"));
    }

    #[test]
    fn test_quoted_argument() {
        let nodes = parse("(upper 'a (b)')").unwrap();
        let Node::Call(call) = &nodes[0] else {
            panic!("expected call");
        };
        assert_eq!(call.words[1].as_literal(), Some("a (b)"));
    }

    #[test]
    fn test_unbalanced() {
        assert!(matches!(
            parse("(dirname {x}"),
            Err(TemplateError::Malformed { .. })
        ));
        assert!(matches!(parse("()"), Err(TemplateError::Malformed { .. })));
    }
}
