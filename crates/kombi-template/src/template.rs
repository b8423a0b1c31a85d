//! Template evaluation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{Result, TemplateError};
use crate::parser::{self, operator, Call, Node, Word};
use crate::procedures::{procedures, ProcedureRegistry};
use crate::scope::Scope;

const EVAL_PREFIX: &str = "!kt ";

/// A parsed template.
///
/// Parsing happens once in [`Template::new`]; malformed text is rejected
/// there so configuration errors surface at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    raw: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a template.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let body = raw.strip_prefix(EVAL_PREFIX).unwrap_or(&raw);
        let nodes = parser::parse(body)?;
        Ok(Self { raw, nodes })
    }

    /// The source text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the template has no content.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate against a scope using the process-wide procedure registry.
    pub fn value(&self, scope: &Scope) -> Result<String> {
        self.value_with(scope, procedures())
    }

    /// Evaluate against a scope using an explicit procedure registry.
    pub fn value_with(&self, scope: &Scope, registry: &ProcedureRegistry) -> Result<String> {
        let mut eval = Evaluator {
            template: &self.raw,
            scope,
            tokens: scope.tokens().clone(),
            registry,
        };
        let mut out = String::new();
        for node in &self.nodes {
            out.push_str(&eval.node(node)?);
        }
        resolve_required_levels(&out)
    }

    /// Parse and evaluate in one step.
    pub fn evaluate(raw: &str, scope: &Scope) -> Result<String> {
        Self::new(raw)?.value(scope)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Template::new(raw).map_err(serde::de::Error::custom)
    }
}

struct Evaluator<'a> {
    template: &'a str,
    scope: &'a Scope,
    tokens: BTreeMap<String, String>,
    registry: &'a ProcedureRegistry,
}

impl Evaluator<'_> {
    fn node(&mut self, node: &Node) -> Result<String> {
        match node {
            Node::Literal(text) => Ok(text.clone()),
            Node::Var(name) => self
                .scope
                .var(name)
                .map(ToString::to_string)
                .ok_or_else(|| TemplateError::VarNotFound {
                    name: name.clone(),
                    template: self.template.to_string(),
                }),
            Node::Token(name) => {
                self.tokens
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::TokenNotFound {
                        name: name.clone(),
                        template: self.template.to_string(),
                    })
            }
            Node::Call(call) => self.call(call),
        }
    }

    fn word(&mut self, word: &Word) -> Result<String> {
        let mut out = String::new();
        for part in &word.parts {
            out.push_str(&self.node(part)?);
        }
        Ok(out)
    }

    fn call(&mut self, call: &Call) -> Result<String> {
        // A registered head makes the call a procedure even when the words
        // also read as `a - b`.
        let procedure_head = call.words[0]
            .as_literal()
            .is_some_and(|head| self.registry.contains(head));
        let value = if call.is_arithmetic() && !procedure_head {
            self.arithmetic(&call.words)?
        } else {
            let name = self.word(&call.words[0])?;
            let args = call.words[1..]
                .iter()
                .map(|w| self.word(w))
                .collect::<Result<Vec<_>>>()?;
            self.registry.call(&name, &args)?
        };

        if let Some(token) = &call.assign {
            self.tokens.insert(token.clone(), value.clone());
        }
        Ok(value)
    }

    /// Evaluate `a op b op c ...` with `*` and `/` binding tighter.
    fn arithmetic(&mut self, words: &[Word]) -> Result<String> {
        let mut operands = Vec::with_capacity(words.len() / 2 + 1);
        for w in words.iter().step_by(2) {
            let text = self.word(w)?;
            let number: f64 = text.trim().parse().map_err(|_| {
                TemplateError::malformed(
                    self.template,
                    format!("arithmetic operand is not a number: {text:?}"),
                )
            })?;
            operands.push(number);
        }
        let ops: Vec<char> = words
            .iter()
            .skip(1)
            .step_by(2)
            .filter_map(|w| w.as_literal().and_then(operator))
            .collect();

        // first pass: multiplicative
        let mut terms = vec![operands[0]];
        let mut additive = Vec::new();
        for (op, rhs) in ops.iter().zip(operands.iter().skip(1)) {
            match op {
                '*' | '/' => {
                    let lhs = terms.pop().unwrap_or_default();
                    if *op == '/' && *rhs == 0.0 {
                        return Err(TemplateError::malformed(self.template, "division by zero"));
                    }
                    terms.push(if *op == '*' { lhs * rhs } else { lhs / rhs });
                }
                _ => {
                    additive.push(*op);
                    terms.push(*rhs);
                }
            }
        }

        let mut result = terms[0];
        for (op, rhs) in additive.iter().zip(terms.iter().skip(1)) {
            if *op == '+' {
                result += rhs;
            } else {
                result -= rhs;
            }
        }
        Ok(format_number(result))
    }
}

/// Render a number the way templates print them: integral values without a
/// fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Strip `!` markers from path levels, checking that each marked prefix exists.
fn resolve_required_levels(path: &str) -> Result<String> {
    if !path.starts_with('!') && !path.contains("/!") {
        return Ok(path.to_string());
    }

    let mut resolved: Vec<&str> = Vec::new();
    for level in path.split('/') {
        match level.strip_prefix('!') {
            Some(stripped) => {
                resolved.push(stripped);
                let current = resolved.join("/");
                let check = if current.is_empty() { "/" } else { current.as_str() };
                if !Path::new(check).exists() {
                    return Err(TemplateError::RequiredPathNotFound { path: current });
                }
            }
            None => resolved.push(level),
        }
    }
    Ok(resolved.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.set_var("x", 5);
        scope.set_var("y", 2);
        scope.set_var("name", "testSeq");
        scope.set_var("filePath", "/shots/seq/testSeq.0001.exr");
        scope
    }

    #[test]
    fn test_literal_round_trip() {
        for raw in ["/a/b/c.exr", "plain text", "it's fine", "", "a{b c}"] {
            assert_eq!(Template::evaluate(raw, &scope()).unwrap(), raw);
        }
    }

    #[test]
    fn test_arithmetic_and_tokens() {
        let result =
            Template::evaluate("!kt /({x} + 10 as <r>)/(<r> - 10)/(4.0 / {y})", &scope()).unwrap();
        assert_eq!(result, "/15/5/2");
    }

    #[test]
    fn test_precedence() {
        assert_eq!(Template::evaluate("(1 + 2 * 3)", &scope()).unwrap(), "7");
        assert_eq!(Template::evaluate("(7 / 2)", &scope()).unwrap(), "3.5");
        assert_eq!(Template::evaluate("(10 - 2 - 3)", &scope()).unwrap(), "5");
    }

    #[test]
    fn test_procedure_with_operator_argument() {
        let registry = ProcedureRegistry::with_standard();
        registry.register(crate::Procedure::new("join", 3, Some(3), |args| {
            Ok(args.concat())
        }));
        let template = Template::new("(join - {name})").unwrap();
        assert_eq!(template.value_with(&scope(), &registry).unwrap(), "-testSeq");
        let template = Template::new("({x} - {y})").unwrap();
        assert_eq!(template.value_with(&scope(), &registry).unwrap(), "3");
    }

    #[test]
    fn test_variable_and_procedure() {
        let result = Template::evaluate("(dirname {filePath})/{name}_v1.exr", &scope()).unwrap();
        assert_eq!(result, "/shots/seq/testSeq_v1.exr");
    }

    #[test]
    fn test_missing_variable() {
        let err = Template::evaluate("{missing}", &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::VarNotFound { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_missing_token() {
        let err = Template::evaluate("<nope>", &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::TokenNotFound { .. }));
    }

    #[test]
    fn test_scope_tokens_are_visible() {
        let mut scope = scope();
        scope.set_token("root", "/jobs");
        assert_eq!(Template::evaluate("<root>/a", &scope).unwrap(), "/jobs/a");
    }

    #[test]
    fn test_unknown_procedure() {
        let err = Template::evaluate("(nosuchproc 1)", &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::ProcedureNotFound { .. }));
    }

    #[test]
    fn test_required_path() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("glob")).unwrap();
        let data = dir.path().display().to_string();

        let err = Template::evaluate(&format!("!{data}/!badPath/test.exr"), &scope()).unwrap_err();
        assert!(matches!(err, TemplateError::RequiredPathNotFound { .. }));

        let ok = Template::evaluate(&format!("!{data}/!glob"), &scope()).unwrap();
        assert_eq!(ok, format!("{data}/glob"));
    }

    #[test]
    fn test_eval_prefix_is_kept_in_raw() {
        let template = Template::new("!kt {name}.exr").unwrap();
        assert_eq!(template.raw(), "!kt {name}.exr");
        assert_eq!(template.value(&scope()).unwrap(), "testSeq.exr");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.25), "0.25");
    }
}
