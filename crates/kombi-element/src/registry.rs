//! Element kind registry and classification.
//!
//! Kinds are tried most specific first. Kinds registered in a later
//! generation (see [`KindRegistry::begin_generation`]) win over earlier ones;
//! within a generation a kind with a longer parent chain wins, and among
//! equals the later registration wins. A kind accepts an input only when
//! every kind on its parent chain accepts it too, and initialisation runs
//! from the root of the chain down to the kind itself.

use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::element::{Element, ElementInput};
use crate::error::{ElementError, Result};

/// Capability record of one element kind.
pub trait ElementKind: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Declared parent kind.
    fn parent(&self) -> Option<&str> {
        None
    }

    /// Whether this kind accepts the input. `parent` is the element the
    /// input was discovered under, if any.
    fn test(&self, input: &ElementInput, parent: Option<&Element>) -> bool;

    /// Assign variables and tags. Called after every ancestor's `init`.
    fn init(&self, _element: &mut Element, _input: &ElementInput) -> Result<()> {
        Ok(())
    }
}

struct Entry {
    kind: Arc<dyn ElementKind>,
    generation: u64,
    index: u64,
}

#[derive(Clone)]
struct Candidate {
    name: String,
    /// Root first, the kind itself last.
    chain: Vec<Arc<dyn ElementKind>>,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    generation: u64,
    next_index: u64,
    ordered: Arc<Vec<Candidate>>,
}

impl State {
    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.kind.name() == name)
    }

    /// Parent chain of `name`, root first. `None` when an ancestor is
    /// missing or the chain loops.
    fn chain(&self, name: &str) -> Option<Vec<Arc<dyn ElementKind>>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                return None;
            }
            let entry = self.find(&name)?;
            current = entry.kind.parent().map(str::to_string);
            chain.push(entry.kind.clone());
        }
        chain.reverse();
        Some(chain)
    }

    fn reorder(&mut self) {
        let mut ranked: Vec<(u64, usize, u64, Candidate)> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = entry.kind.name().to_string();
            match self.chain(&name) {
                Some(chain) => {
                    ranked.push((entry.generation, chain.len(), entry.index, Candidate { name, chain }))
                }
                None => tracing::debug!("Element kind {} has an unresolved parent chain", name),
            }
        }
        ranked.sort_by_key(|(generation, depth, index, _)| {
            (Reverse(*generation), Reverse(*depth), Reverse(*index))
        });
        self.ordered = Arc::new(ranked.into_iter().map(|(_, _, _, c)| c).collect());
    }
}

/// Ordered table of element kinds.
#[derive(Default)]
pub struct KindRegistry {
    state: RwLock<State>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.classification_order())
            .finish()
    }
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in kinds.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        crate::kinds::register_builtin(&registry);
        registry
    }

    /// Start a new registration generation. Kinds registered afterwards take
    /// precedence over every kind registered before.
    pub fn begin_generation(&self) -> u64 {
        let mut state = self.state.write();
        state.generation += 1;
        state.generation
    }

    /// Register (or replace) a kind in the current generation.
    pub fn register<K: ElementKind + 'static>(&self, kind: K) {
        self.register_arc(Arc::new(kind));
    }

    /// Register (or replace) a shared kind in the current generation.
    pub fn register_arc(&self, kind: Arc<dyn ElementKind>) {
        tracing::debug!("Registering element kind: {}", kind.name());
        let mut state = self.state.write();
        state.entries.retain(|e| e.kind.name() != kind.name());
        let entry = Entry {
            kind,
            generation: state.generation,
            index: state.next_index,
        };
        state.next_index += 1;
        state.entries.push(entry);
        state.reorder();
    }

    /// Whether a kind is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.state.read().find(name).is_some()
    }

    /// Look up a kind.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ElementKind>> {
        self.state.read().find(name).map(|e| e.kind.clone())
    }

    /// Sorted kind names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .entries
            .iter()
            .map(|e| e.kind.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Kind names in the order classification tries them.
    pub fn classification_order(&self) -> Vec<String> {
        self.state.read().ordered.iter().map(|c| c.name.clone()).collect()
    }

    /// `name` followed by its ancestors, nearest first.
    pub fn ancestry(&self, name: &str) -> Vec<String> {
        self.state
            .read()
            .chain(name)
            .map(|chain| chain.iter().rev().map(|k| k.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Whether `kind` is `ancestor` or derives from it.
    pub fn is_kind_of(&self, kind: &str, ancestor: &str) -> bool {
        kind == ancestor || self.ancestry(kind).iter().any(|k| k == ancestor)
    }

    /// Name of the first kind accepting the input.
    pub fn classify(&self, input: &ElementInput, parent: Option<&Element>) -> Option<String> {
        let ordered = self.state.read().ordered.clone();
        ordered
            .iter()
            .find(|candidate| candidate.chain.iter().all(|k| k.test(input, parent)))
            .map(|candidate| candidate.name.clone())
    }

    /// Build an element. With a kind hint the named kind is used without
    /// running its predicate.
    pub fn create(
        &self,
        input: ElementInput,
        kind_hint: Option<&str>,
        parent: Option<&Arc<Element>>,
    ) -> Result<Element> {
        let name = match kind_hint {
            Some(hint) => hint.to_string(),
            None => self
                .classify(&input, parent.map(|p| p.as_ref()))
                .ok_or_else(|| ElementError::NoMatchingKind(Element::describe_input(&input)))?,
        };

        let chain = self
            .state
            .read()
            .chain(&name)
            .ok_or_else(|| ElementError::KindNotFound(name.clone()))?;

        let mut element = Element::new(name, input.path().cloned());
        if let Some(parent) = parent {
            element.set_parent(parent);
        }
        for kind in &chain {
            kind.init(&mut element, &input)?;
        }
        Ok(element)
    }
}

/// The process-wide registry, initialised with the built-in kinds.
pub fn kinds() -> &'static KindRegistry {
    static REGISTRY: OnceLock<KindRegistry> = OnceLock::new();
    REGISTRY.get_or_init(KindRegistry::with_builtin)
}
