//! Block scopes and logical threads.
//!
//! Scopes live in an arena owned by the evaluation context. Threads and
//! closures refer to them by `ScopeId`, so several closures created at the
//! same point share (and mutate) the same bindings.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use serde::Serialize;

use crate::value::Value;

/// Index of a block scope in the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub(crate) u32);

/// Index of a logical thread in the thread arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ThreadId(pub(crate) u32);

/// One lexical frame: bindings plus the names bound as `const`.
#[derive(Debug, Clone, Default)]
pub struct BlockScope {
    vars: HashMap<String, Value>,
    consts: HashSet<String>,
    /// Value produced by the block, if any.
    pub return_value: Option<Value>,
}

impl BlockScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a binding.
    pub fn declare(&mut self, name: &str, value: Value, constant: bool) {
        if constant {
            self.consts.insert(name.to_string());
        } else {
            self.consts.remove(name);
        }
        self.vars.insert(name.to_string(), value);
    }

    /// Read a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Overwrite an existing binding. Returns false when absent.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.vars.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Check whether the scope binds `name`.
    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Check whether `name` is bound as `const`.
    pub fn is_const(&self, name: &str) -> bool {
        self.consts.contains(name)
    }

    /// All bound values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.vars.values().chain(self.return_value.iter())
    }
}

struct ScopeSlot {
    scope: BlockScope,
    /// Referenced by at least one closure.
    captured: bool,
}

/// Arena of block scopes.
#[derive(Default)]
pub struct ScopeArena {
    /// Scope storage.
    slots: Vec<Option<ScopeSlot>>,
    /// Free list.
    free_list: Vec<u32>,
}

impl ScopeArena {
    /// Create a new arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a scope.
    pub fn alloc(&mut self, scope: BlockScope) -> ScopeId {
        let slot = Some(ScopeSlot {
            scope,
            captured: false,
        });
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = slot;
            ScopeId(index)
        } else {
            self.slots.push(slot);
            ScopeId((self.slots.len() - 1) as u32)
        }
    }

    /// Get a scope.
    pub fn get(&self, id: ScopeId) -> Option<&BlockScope> {
        self.slots
            .get(id.0 as usize)
            .and_then(|s| s.as_ref())
            .map(|s| &s.scope)
    }

    /// Get a mutable scope.
    pub fn get_mut(&mut self, id: ScopeId) -> Option<&mut BlockScope> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.scope)
    }

    /// Mark a scope as referenced by a closure.
    pub fn mark_captured(&mut self, id: ScopeId) {
        if let Some(Some(slot)) = self.slots.get_mut(id.0 as usize) {
            slot.captured = true;
        }
    }

    /// Check whether a closure references the scope.
    pub fn is_captured(&self, id: ScopeId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Some(slot)) if slot.captured)
    }

    /// Release a scope whose block has exited. Captured scopes stay alive
    /// until a collection finds them unreachable.
    pub fn release(&mut self, id: ScopeId) -> bool {
        if self.is_captured(id) {
            return false;
        }
        self.free(id)
    }

    /// Free a scope unconditionally.
    pub(crate) fn free(&mut self, id: ScopeId) -> bool {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.free_list.push(id.0);
                true
            }
            _ => false,
        }
    }

    /// Ids of all live scopes.
    pub fn ids(&self) -> Vec<ScopeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| ScopeId(i as u32))
            .collect()
    }

    /// Number of live scopes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Whether no scope is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One independent execution context.
#[derive(Debug, Clone)]
pub struct LogicalThread {
    /// Open block scopes, outermost first.
    pub blocks: Vec<ScopeId>,
    /// Captured closure scopes, outermost first.
    pub closures: Rc<[ScopeId]>,
    /// Thread consulted after this one during lookup.
    pub parent: Option<ThreadId>,
    /// Value of the last executed top-level `return`.
    pub return_value: Option<Value>,
}

impl Default for LogicalThread {
    fn default() -> Self {
        LogicalThread {
            blocks: Vec::new(),
            closures: Rc::from(Vec::new()),
            parent: None,
            return_value: None,
        }
    }
}

impl LogicalThread {
    /// Scope chain as seen by a closure created now, outermost first.
    pub fn scope_chain(&self) -> Rc<[ScopeId]> {
        self.closures
            .iter()
            .chain(self.blocks.iter())
            .copied()
            .collect()
    }
}

/// Arena of logical threads.
#[derive(Default)]
pub struct ThreadArena {
    slots: Vec<Option<LogicalThread>>,
    free_list: Vec<u32>,
}

impl ThreadArena {
    /// Create a new arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread.
    pub fn insert(&mut self, thread: LogicalThread) -> ThreadId {
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(thread);
            ThreadId(index)
        } else {
            self.slots.push(Some(thread));
            ThreadId((self.slots.len() - 1) as u32)
        }
    }

    /// Get a thread.
    pub fn get(&self, id: ThreadId) -> Option<&LogicalThread> {
        self.slots.get(id.0 as usize).and_then(|t| t.as_ref())
    }

    /// Get a mutable thread.
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut LogicalThread> {
        self.slots.get_mut(id.0 as usize).and_then(|t| t.as_mut())
    }

    /// Remove a thread.
    pub fn remove(&mut self, id: ThreadId) -> Option<LogicalThread> {
        let thread = self.slots.get_mut(id.0 as usize)?.take()?;
        self.free_list.push(id.0);
        Some(thread)
    }

    /// Iterate over live threads.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalThread> {
        self.slots.iter().filter_map(|t| t.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_tracking() {
        let mut scope = BlockScope::new();
        scope.declare("x", Value::from(3), true);
        assert!(scope.is_const("x"));
        scope.declare("x", Value::from(4), false);
        assert!(!scope.is_const("x"));
        assert!(!scope.set("y", Value::Null));
    }

    #[test]
    fn test_captured_scopes_survive_release() {
        let mut arena = ScopeArena::new();
        let a = arena.alloc(BlockScope::new());
        let b = arena.alloc(BlockScope::new());
        arena.mark_captured(b);
        assert!(arena.release(a));
        assert!(!arena.release(b));
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 1);

        let c = arena.alloc(BlockScope::new());
        assert_eq!(c, a);
    }

    #[test]
    fn test_scope_chain_order() {
        let thread = LogicalThread {
            blocks: vec![ScopeId(3), ScopeId(4)],
            closures: Rc::from(vec![ScopeId(1), ScopeId(2)]),
            ..LogicalThread::default()
        };
        assert_eq!(
            &*thread.scope_chain(),
            &[ScopeId(1), ScopeId(2), ScopeId(3), ScopeId(4)]
        );
    }
}
