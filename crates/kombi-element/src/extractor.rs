//! Variable extraction from structured base names.
//!
//! A pattern is a sequence of:
//!
//! - literal characters, matched exactly;
//! - `#`, a single digit;
//! - `*`, the shortest run up to the next literal character;
//! - `{name}`, a field captured up to the next literal character;
//! - `{name:N}`, a field of exactly `N` characters;
//! - `{name:Ni}` (or `{name:i}`), the same but parsed as an integer.
//!
//! An unsized field or a glob must be followed by a literal character (or
//! end the pattern). Anything else cannot be matched deterministically and is
//! rejected when the pattern is compiled.

use kombi_common::{Value, VarMap};

/// Reasons a subject fails to match a pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VarExtractorError {
    /// The subject differs from the pattern at `position`.
    #[error("character at position {position} does not match (expected {expected}, found {found:?})")]
    NotMatchingChar {
        position: usize,
        expected: String,
        found: Option<char>,
    },

    /// The literal that terminates a glob or field never appears.
    #[error("missing separator {separator:?} after position {position}")]
    MissingSeparator { position: usize, separator: char },

    /// A glob or unsized field is followed by something other than a literal.
    #[error("cannot find expected char after glob at pattern position {position}")]
    CannotFindExpectedChar { position: usize },

    /// The pattern text is malformed.
    #[error("invalid extractor pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl VarExtractorError {
    /// Whether the error is a defect of the pattern rather than of the subject.
    pub fn is_pattern_error(&self) -> bool {
        matches!(
            self,
            Self::CannotFindExpectedChar { .. } | Self::InvalidPattern { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(char),
    Digit,
    Glob,
    Field {
        name: String,
        size: Option<usize>,
        integer: bool,
    },
}

impl Token {
    fn is_unsized(&self) -> bool {
        matches!(self, Token::Glob | Token::Field { size: None, .. })
    }
}

/// A compiled extractor pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorPattern {
    source: String,
    tokens: Vec<Token>,
}

impl ExtractorPattern {
    /// Compile a pattern, rejecting ambiguous or malformed ones.
    pub fn compile(source: &str) -> Result<Self, VarExtractorError> {
        let invalid = |message: &str| VarExtractorError::InvalidPattern {
            pattern: source.to_string(),
            message: message.to_string(),
        };

        let mut tokens = Vec::new();
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '#' => tokens.push(Token::Digit),
                '*' => tokens.push(Token::Glob),
                '{' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => body.push(c),
                            None => return Err(invalid("unterminated field")),
                        }
                    }
                    tokens.push(parse_field(&body).ok_or_else(|| invalid("bad field spec"))?);
                }
                c => tokens.push(Token::Literal(c)),
            }
        }

        for (index, pair) in tokens.windows(2).enumerate() {
            if pair[0].is_unsized() && !matches!(pair[1], Token::Literal(_)) {
                return Err(VarExtractorError::CannotFindExpectedChar { position: index });
            }
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// The pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the fields declared by the pattern, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Match `subject`, returning the captured variables and the consumed
    /// segments (one per token).
    fn scan(&self, subject: &str) -> Result<(VarMap, Vec<String>), VarExtractorError> {
        let chars: Vec<char> = subject.chars().collect();
        let mut vars = VarMap::new();
        let mut segments = Vec::with_capacity(self.tokens.len());
        let mut pos = 0;

        for (index, token) in self.tokens.iter().enumerate() {
            let next_literal = match self.tokens.get(index + 1) {
                Some(Token::Literal(c)) => Some(*c),
                _ => None,
            };

            match token {
                Token::Literal(expected) => {
                    let found = chars.get(pos).copied();
                    if found != Some(*expected) {
                        return Err(VarExtractorError::NotMatchingChar {
                            position: pos,
                            expected: format!("{expected:?}"),
                            found,
                        });
                    }
                    segments.push(expected.to_string());
                    pos += 1;
                }
                Token::Digit => {
                    let found = chars.get(pos).copied();
                    match found {
                        Some(c) if c.is_ascii_digit() => {
                            segments.push(c.to_string());
                            pos += 1;
                        }
                        _ => {
                            return Err(VarExtractorError::NotMatchingChar {
                                position: pos,
                                expected: "digit".to_string(),
                                found,
                            })
                        }
                    }
                }
                Token::Glob => {
                    let end = run_end(&chars, pos, next_literal)?;
                    segments.push(chars[pos..end].iter().collect());
                    pos = end;
                }
                Token::Field {
                    name,
                    size,
                    integer,
                } => {
                    let end = match size {
                        Some(n) if pos + n <= chars.len() => pos + n,
                        Some(_) => {
                            return Err(VarExtractorError::NotMatchingChar {
                                position: chars.len(),
                                expected: format!("field {name}"),
                                found: None,
                            })
                        }
                        None => run_end(&chars, pos, next_literal)?,
                    };
                    let raw: String = chars[pos..end].iter().collect();
                    let value = if *integer {
                        if let Some(offset) = raw.chars().position(|c| !c.is_ascii_digit()) {
                            return Err(VarExtractorError::NotMatchingChar {
                                position: pos + offset,
                                expected: "digit".to_string(),
                                found: chars.get(pos + offset).copied(),
                            });
                        }
                        let number: i64 =
                            raw.parse()
                                .map_err(|_| VarExtractorError::NotMatchingChar {
                                    position: pos,
                                    expected: "integer".to_string(),
                                    found: chars.get(pos).copied(),
                                })?;
                        Value::Int(number)
                    } else {
                        Value::Str(raw.clone())
                    };
                    vars.insert(name.clone(), value);
                    segments.push(raw);
                    pos = end;
                }
            }
        }

        if pos < chars.len() {
            return Err(VarExtractorError::NotMatchingChar {
                position: pos,
                expected: "end of name".to_string(),
                found: chars.get(pos).copied(),
            });
        }
        Ok((vars, segments))
    }
}

/// End index of a glob or unsized field starting at `pos`.
fn run_end(chars: &[char], pos: usize, terminator: Option<char>) -> Result<usize, VarExtractorError> {
    match terminator {
        None => Ok(chars.len()),
        Some(sep) => chars[pos.min(chars.len())..]
            .iter()
            .position(|c| *c == sep)
            .map(|offset| pos + offset)
            .ok_or(VarExtractorError::MissingSeparator {
                position: pos,
                separator: sep,
            }),
    }
}

fn parse_field(body: &str) -> Option<Token> {
    let (name, rule) = match body.split_once(':') {
        Some((name, rule)) => (name, Some(rule)),
        None => (body, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let (size, integer) = match rule {
        None => (None, false),
        Some(rule) => {
            let (digits, integer) = match rule.strip_suffix('i') {
                Some(digits) => (digits, true),
                None => (rule, false),
            };
            let size = if digits.is_empty() {
                None
            } else {
                Some(digits.parse::<usize>().ok().filter(|n| *n > 0)?)
            };
            if size.is_none() && !integer {
                return None;
            }
            (size, integer)
        }
    };

    Some(Token::Field {
        name: name.to_string(),
        size,
        integer,
    })
}

/// The outcome of matching one subject against one pattern.
///
/// # Examples
///
/// ```
/// use kombi_element::VarExtractor;
///
/// let extractor = VarExtractor::new("sh010_plate.exr", "{shot}_{kind}.{ext}");
/// assert!(extractor.matches());
/// assert_eq!(extractor.var("shot").unwrap().to_string(), "sh010");
/// ```
#[derive(Debug, Clone)]
pub struct VarExtractor {
    vars: VarMap,
    segments: Vec<String>,
    error: Option<VarExtractorError>,
}

impl VarExtractor {
    /// Match `subject` against `pattern`. Failures are recorded, not raised.
    pub fn new(subject: &str, pattern: &str) -> Self {
        match ExtractorPattern::compile(pattern) {
            Ok(compiled) => Self::with_pattern(subject, &compiled),
            Err(error) => Self::failed(error),
        }
    }

    /// Match `subject` against an already compiled pattern.
    pub fn with_pattern(subject: &str, pattern: &ExtractorPattern) -> Self {
        match pattern.scan(subject) {
            Ok((vars, segments)) => Self {
                vars,
                segments,
                error: None,
            },
            Err(error) => Self::failed(error),
        }
    }

    /// Like [`VarExtractor::new`] but raises pattern defects immediately.
    pub fn checked(subject: &str, pattern: &str) -> Result<Self, VarExtractorError> {
        let compiled = ExtractorPattern::compile(pattern)?;
        Ok(Self::with_pattern(subject, &compiled))
    }

    fn failed(error: VarExtractorError) -> Self {
        Self {
            vars: VarMap::new(),
            segments: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether the subject matched.
    pub fn matches(&self) -> bool {
        self.error.is_none()
    }

    /// The failure, if the subject did not match.
    pub fn error(&self) -> Option<&VarExtractorError> {
        self.error.as_ref()
    }

    /// Captured variables (empty when the match failed).
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Consume the extractor, returning its variables or its error.
    pub fn into_result(self) -> Result<VarMap, VarExtractorError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.vars),
        }
    }

    /// A single captured variable.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// The subject rebuilt from matched literals and raw captures.
    pub fn reconstruct(&self) -> String {
        self.segments.concat()
    }
}

/// Match and return the variables, raising any failure.
pub fn parse(subject: &str, pattern: &str) -> Result<VarMap, VarExtractorError> {
    VarExtractor::checked(subject, pattern)?.into_result()
}
