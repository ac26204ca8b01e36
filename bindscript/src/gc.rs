//! Scope reclamation.
//!
//! Simple mark-and-sweep over the scope arena. Scopes a closure captured
//! outlive their block; they are freed once no live thread, container or
//! caller-supplied value can reach them.

use hashbrown::HashSet;

use crate::object::Function;
use crate::scope::{ScopeArena, ScopeId};
use crate::value::Value;

/// Garbage collector for captured scopes.
pub struct GarbageCollector {
    /// Collection threshold.
    threshold: usize,
    /// Scopes allocated since last collection.
    allocations: usize,
    /// Scopes freed over the collector's lifetime.
    reclaimed: usize,
}

impl GarbageCollector {
    /// Create with custom threshold.
    pub fn with_threshold(threshold: usize) -> Self {
        GarbageCollector {
            threshold,
            allocations: 0,
            reclaimed: 0,
        }
    }

    /// Record a scope allocation.
    pub fn track(&mut self) {
        self.allocations += 1;
    }

    /// Check if collection is needed.
    pub fn should_collect(&self) -> bool {
        self.threshold > 0 && self.allocations >= self.threshold
    }

    /// Collect unreachable scopes. Returns how many were freed.
    pub fn collect(
        &mut self,
        arena: &mut ScopeArena,
        root_scopes: &[ScopeId],
        root_values: &[Value],
    ) -> usize {
        // Mark phase
        let marked = self.mark(arena, root_scopes, root_values);

        // Sweep phase
        let freed = self.sweep(arena, &marked);

        self.allocations = 0;
        self.reclaimed += freed;
        log::debug!(
            "[GC] Collected {} scopes, {} live",
            freed,
            arena.len()
        );
        freed
    }

    /// Mark reachable scopes.
    fn mark(
        &self,
        arena: &ScopeArena,
        root_scopes: &[ScopeId],
        root_values: &[Value],
    ) -> HashSet<ScopeId> {
        let mut marker = Marker {
            arena,
            scopes: HashSet::new(),
            visited: HashSet::new(),
            pending: root_scopes.to_vec(),
        };
        for value in root_values {
            marker.mark_value(value);
        }
        while let Some(id) = marker.pending.pop() {
            if !marker.scopes.insert(id) {
                continue;
            }
            if let Some(scope) = arena.get(id) {
                for value in scope.values() {
                    marker.mark_value(value);
                }
            }
        }
        marker.scopes
    }

    /// Sweep unmarked scopes.
    fn sweep(&self, arena: &mut ScopeArena, marked: &HashSet<ScopeId>) -> usize {
        let mut freed = 0;
        for id in arena.ids() {
            if !marked.contains(&id) && arena.free(id) {
                freed += 1;
            }
        }
        freed
    }

    /// Get statistics.
    pub fn stats(&self, arena: &ScopeArena) -> GcStats {
        GcStats {
            live_scopes: arena.len(),
            allocations_since_gc: self.allocations,
            reclaimed: self.reclaimed,
            threshold: self.threshold,
        }
    }
}

/// Worklist state of one mark phase.
struct Marker<'a> {
    arena: &'a ScopeArena,
    scopes: HashSet<ScopeId>,
    /// Shared containers already traversed, by address.
    visited: HashSet<usize>,
    pending: Vec<ScopeId>,
}

impl Marker<'_> {
    fn mark_value(&mut self, value: &Value) {
        match value {
            Value::Array(elements) => {
                if self.visited.insert(elements.as_ptr() as usize) {
                    for element in elements.borrow().iter() {
                        self.mark_value(element);
                    }
                }
            }
            Value::Object(obj) => {
                if self.visited.insert(obj.as_ptr() as usize) {
                    for (_, property) in obj.borrow().iter() {
                        self.mark_value(property);
                    }
                }
            }
            Value::Function(function) => {
                if let Function::Closure(closure) = &**function {
                    for id in closure.captured.iter() {
                        if self.arena.get(*id).is_some() && !self.scopes.contains(id) {
                            self.pending.push(*id);
                        }
                    }
                }
            }
            Value::Tagged(tagged) => self.mark_value(&tagged.payload),
            _ => {}
        }
    }
}

/// GC statistics.
#[derive(Clone, Debug)]
pub struct GcStats {
    /// Scopes currently allocated.
    pub live_scopes: usize,
    /// Allocations since last GC.
    pub allocations_since_gc: usize,
    /// Scopes freed so far.
    pub reclaimed: usize,
    /// Collection threshold.
    pub threshold: usize,
}
