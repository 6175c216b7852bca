//! `OperatorRegistry<E>`: an ordered, thread-safe collection of operators
//! with an optional parent and first-match selection.
//!
//! Grounded on spec.md §4.3 and the parent/fallback composition pattern
//! mirrored structurally by the corpus's context objects (a child context
//! inherits the parent's filters/operators by reference rather than by
//! copying). Uses `std::sync::RwLock` per spec.md §5 ("concurrent readers,
//! exclusive writers"); selection never awaits, so no async lock is
//! needed.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::type_descriptor::TypeDescriptor;

struct Entry<E> {
    qualifier: TypeDescriptor,
    operator: E,
}

/// An ordered sequence of `(qualifier, operator)` entries with an optional
/// parent registry.
///
/// `E` is typically a cheaply-`Clone`-able handle (`Arc<dyn Trait>`); a
/// registry never takes ownership of its parent (spec.md §3), so the
/// parent link is itself an `Arc` the owning context shares, not clones
/// into new state.
pub struct OperatorRegistry<E> {
    entries: RwLock<Vec<Entry<E>>>,
    parent: Option<Arc<OperatorRegistry<E>>>,
}

impl<E: Clone> OperatorRegistry<E> {
    pub fn new() -> Self {
        OperatorRegistry {
            entries: RwLock::new(Vec::new()),
            parent: None,
        }
    }

    pub fn with_parent(parent: Arc<OperatorRegistry<E>>) -> Self {
        OperatorRegistry {
            entries: RwLock::new(Vec::new()),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Arc<OperatorRegistry<E>>> {
        self.parent.as_ref()
    }

    /// Inserts at the front: later registrations shadow earlier ones.
    /// The corpus's convention for readers, writers, and stream variants
    /// (spec.md §4.3 "Ordering rationale").
    pub fn register_first(&self, qualifier: TypeDescriptor, operator: E) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.insert(0, Entry { qualifier, operator });
    }

    /// Inserts at the back: preserves pipeline order. The corpus's
    /// convention for filters.
    pub fn register_last(&self, qualifier: TypeDescriptor, operator: E) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.push(Entry { qualifier, operator });
    }

    /// First operator (in this registry, then ancestors, then `fallback`
    /// and *its* ancestors) for which `predicate` holds. `fallback` is
    /// consulted at most once and never delegates to a fallback of its own
    /// (spec.md §4.3 "Tie-breaks").
    pub fn select<F>(&self, predicate: F, fallback: Option<&OperatorRegistry<E>>) -> Option<E>
    where
        F: Fn(&TypeDescriptor, &E) -> bool,
    {
        self.select_in_lineage(&predicate)
            .or_else(|| fallback.and_then(|fb| fb.select_in_lineage(&predicate)))
    }

    fn select_in_lineage<F>(&self, predicate: &F) -> Option<E>
    where
        F: Fn(&TypeDescriptor, &E) -> bool,
    {
        {
            let entries = self.entries.read().expect("registry lock poisoned");
            for entry in entries.iter() {
                if predicate(&entry.qualifier, &entry.operator) {
                    return Some(entry.operator.clone());
                }
            }
        }
        self.parent.as_ref().and_then(|p| p.select_in_lineage(predicate))
    }

    /// Shortcut for callers that want a specific registered operator by its
    /// qualifier, regardless of its `accept()` (spec.md §4.5
    /// "reader-by-class selection").
    pub fn get(&self, qualifier: &TypeDescriptor, fallback: Option<&OperatorRegistry<E>>) -> Option<E> {
        self.select(|q, _| q == qualifier, fallback)
    }

    /// Like [`select`](Self::select), but `matcher` returns an arbitrary
    /// value alongside the match instead of a bare `bool`. Writer selection
    /// needs this: `accept()` returns the writer's [`crate::operators::WriteAck`]
    /// as its opt-in signal, not a separate predicate and payload.
    pub fn select_map<F, R>(&self, matcher: F, fallback: Option<&OperatorRegistry<E>>) -> Option<(E, R)>
    where
        F: Fn(&TypeDescriptor, &E) -> Option<R>,
    {
        self.select_map_in_lineage(&matcher)
            .or_else(|| fallback.and_then(|fb| fb.select_map_in_lineage(&matcher)))
    }

    fn select_map_in_lineage<F, R>(&self, matcher: &F) -> Option<(E, R)>
    where
        F: Fn(&TypeDescriptor, &E) -> Option<R>,
    {
        {
            let entries = self.entries.read().expect("registry lock poisoned");
            for entry in entries.iter() {
                if let Some(r) = matcher(&entry.qualifier, &entry.operator) {
                    return Some((entry.operator.clone(), r));
                }
            }
        }
        self.parent.as_ref().and_then(|p| p.select_map_in_lineage(matcher))
    }

    /// This registry's own entries, in insertion order, not including any
    /// ancestor. Used by the filter chain fold (spec.md §4.4), which needs
    /// "every filter at this level" rather than "first match".
    pub fn snapshot(&self) -> Vec<E> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.operator.clone())
            .collect()
    }

    /// A snapshot of the current entries' qualifiers, for diagnostics.
    pub fn qualifiers(&self) -> Vec<TypeDescriptor> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.qualifier)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> Default for OperatorRegistry<E> {
    fn default() -> Self {
        OperatorRegistry::new()
    }
}

impl<E> fmt::Debug for OperatorRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("len", &self.entries.read().map(|e| e.len()).unwrap_or(0))
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualifier<T: 'static>() -> TypeDescriptor {
        TypeDescriptor::of::<T>()
    }

    #[test]
    fn first_match_wins_within_one_registry() {
        let reg: OperatorRegistry<&'static str> = OperatorRegistry::new();
        reg.register_first(qualifier::<u8>(), "second");
        reg.register_first(qualifier::<u8>(), "first");
        let found = reg.select(|_, _| true, None);
        assert_eq!(found, Some("first"));
    }

    #[test]
    fn register_last_preserves_pipeline_order() {
        let reg: OperatorRegistry<u32> = OperatorRegistry::new();
        reg.register_last(qualifier::<u8>(), 1);
        reg.register_last(qualifier::<u16>(), 2);
        reg.register_last(qualifier::<u32>(), 3);
        assert_eq!(reg.qualifiers(), vec![qualifier::<u8>(), qualifier::<u16>(), qualifier::<u32>()]);
    }

    #[test]
    fn child_searched_before_parent() {
        let parent = Arc::new(OperatorRegistry::new());
        parent.register_first(qualifier::<String>(), "from-parent");
        let child = OperatorRegistry::with_parent(Arc::clone(&parent));
        child.register_first(qualifier::<String>(), "from-child");
        assert_eq!(child.select(|_, _| true, None), Some("from-child"));
    }

    #[test]
    fn parent_searched_when_child_empty() {
        let parent = Arc::new(OperatorRegistry::new());
        parent.register_first(qualifier::<String>(), "from-parent");
        let child: OperatorRegistry<&'static str> = OperatorRegistry::with_parent(Arc::clone(&parent));
        assert_eq!(child.select(|_, _| true, None), Some("from-parent"));
    }

    #[test]
    fn fallback_consulted_only_when_lineage_misses() {
        let fallback: OperatorRegistry<&'static str> = OperatorRegistry::new();
        fallback.register_first(qualifier::<String>(), "from-fallback");
        let child: OperatorRegistry<&'static str> = OperatorRegistry::new();
        assert_eq!(child.select(|_, _| true, Some(&fallback)), Some("from-fallback"));
    }

    #[test]
    fn fallback_never_consults_its_own_fallback() {
        let grandparent_of_fallback: OperatorRegistry<&'static str> = OperatorRegistry::new();
        grandparent_of_fallback.register_first(qualifier::<String>(), "should-not-be-seen");

        let fallback: OperatorRegistry<&'static str> = OperatorRegistry::new();
        let child: OperatorRegistry<&'static str> = OperatorRegistry::new();

        // `fallback` itself has nothing registered and is not linked as a
        // child of `grandparent_of_fallback`; passing it as the fallback
        // must not reach into unrelated registries.
        assert_eq!(child.select(|_, _| true, Some(&fallback)), None);
    }

    #[test]
    fn get_selects_by_qualifier() {
        let reg: OperatorRegistry<&'static str> = OperatorRegistry::new();
        reg.register_first(qualifier::<u8>(), "u8-op");
        reg.register_first(qualifier::<u16>(), "u16-op");
        assert_eq!(reg.get(&qualifier::<u16>(), None), Some("u16-op"));
        assert_eq!(reg.get(&qualifier::<u32>(), None), None);
    }

    #[test]
    fn removing_earlier_entry_does_not_change_later_selection() {
        let reg: OperatorRegistry<u32> = OperatorRegistry::new();
        reg.register_last(qualifier::<u8>(), 1);
        reg.register_last(qualifier::<u16>(), 2);
        let before = reg.select(|q, _| *q == qualifier::<u16>(), None);
        // simulate "removal" by constructing a fresh registry without the
        // earlier entry: selection for the later qualifier is unaffected.
        let reg2: OperatorRegistry<u32> = OperatorRegistry::new();
        reg2.register_last(qualifier::<u16>(), 2);
        let after = reg2.select(|q, _| *q == qualifier::<u16>(), None);
        assert_eq!(before, after);
    }
}
