//! Kinds declared in resource files.

use kombi_common::{Value, VarMap};

use crate::element::{Element, ElementInput};
use crate::error::{ElementError, Result};
use crate::extractor::{ExtractorPattern, VarExtractor};
use crate::registry::ElementKind;
use crate::sequence;

/// A user kind: narrows `parent` with an optional name pattern and assigns
/// fixed variables and tags.
///
/// The pattern runs on the element name with the extension (and, for frame
/// sequences, the frame number) removed, so `{shot}_plate` matches both
/// `sh010_plate.exr` and `sh010_plate.1001.exr`.
#[derive(Debug, Clone)]
pub struct PatternKind {
    name: String,
    parent: String,
    pattern: Option<ExtractorPattern>,
    vars: VarMap,
    tags: VarMap,
    context_vars: Vec<String>,
}

impl PatternKind {
    /// Declare a kind. Pattern defects are reported here, at load time.
    pub fn new(name: impl Into<String>, parent: impl Into<String>, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern.map(ExtractorPattern::compile).transpose()?;
        Ok(Self {
            name: name.into(),
            parent: parent.into(),
            pattern,
            vars: VarMap::new(),
            tags: VarMap::new(),
            context_vars: Vec::new(),
        })
    }

    /// Fixed variables assigned to every element of this kind.
    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }

    /// Fixed tags assigned to every element of this kind.
    pub fn with_tags(mut self, tags: VarMap) -> Self {
        self.tags = tags;
        self
    }

    /// Variables (fixed or extracted) to flag as context variables.
    pub fn with_context_vars(mut self, names: Vec<String>) -> Self {
        self.context_vars = names;
        self
    }

    fn subject(input: &ElementInput) -> Option<String> {
        let base_name = input.path()?.name();
        if let Some(info) = sequence::detect(&base_name) {
            return Some(info.name);
        }
        Some(match base_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => base_name,
        })
    }

    fn extract(&self, input: &ElementInput) -> Option<VarExtractor> {
        let pattern = self.pattern.as_ref()?;
        let subject = Self::subject(input)?;
        Some(VarExtractor::with_pattern(&subject, pattern))
    }
}

impl ElementKind for PatternKind {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&str> {
        Some(&self.parent)
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        match &self.pattern {
            None => true,
            Some(_) => self.extract(input).is_some_and(|e| e.matches()),
        }
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        let mut assigned: Vec<(String, Value)> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(extractor) = self.extract(input) {
            let vars = extractor
                .into_result()
                .map_err(|e| ElementError::init(self.name.as_str(), e.to_string()))?;
            assigned.extend(vars);
        }

        for (name, value) in assigned {
            let is_context = self.context_vars.contains(&name);
            element.set_var(name, value, is_context);
        }
        for (name, value) in &self.tags {
            element.set_tag(name.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KindRegistry;
    use crate::extractor::VarExtractorError;

    fn registry() -> KindRegistry {
        let registry = KindRegistry::with_builtin();
        registry.begin_generation();
        let mut vars = VarMap::new();
        vars.insert("department".into(), Value::from("comp"));
        let kind = PatternKind::new("plateExr", "exr", Some("{shot}_plate"))
            .unwrap()
            .with_vars(vars)
            .with_context_vars(vec!["shot".into()]);
        registry.register(kind);
        registry
    }

    #[test]
    fn test_pattern_kind_wins_and_extracts() {
        let registry = registry();
        let element = registry
            .create("/shots/sh010_plate.1001.exr".into(), None, None)
            .unwrap();
        assert_eq!(element.kind(), "plateExr");
        assert_eq!(element.var("shot").unwrap(), &Value::from("sh010"));
        assert_eq!(element.var("department").unwrap(), &Value::from("comp"));
        assert!(element.is_context_var("shot"));
        // inherited from the image kind
        assert_eq!(element.var("frame").unwrap(), &Value::Int(1001));
    }

    #[test]
    fn test_pattern_kind_falls_through() {
        let registry = registry();
        let element = registry.create("/shots/sh010_bg.exr".into(), None, None).unwrap();
        assert_eq!(element.kind(), "exr");
        let element = registry.create("/shots/sh010_plate.mov".into(), None, None).unwrap();
        assert_eq!(element.kind(), "mov");
    }

    #[test]
    fn test_bad_pattern_rejected_at_declaration() {
        assert!(matches!(
            PatternKind::new("bad", "file", Some("*{a}")),
            Err(ElementError::Extractor(VarExtractorError::CannotFindExpectedChar { .. }))
        ));
    }
}
