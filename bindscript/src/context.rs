//! Evaluation session state.
//!
//! One `EvaluationContext` spans one evaluation session: the global,
//! application and local containers, the scope and thread arenas, the
//! operator registry and the engine configuration. Nothing here is global;
//! drop the context and the session is gone.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::gc::{GarbageCollector, GcStats};
use crate::interpreter::NativeCall;
use crate::object::{Function, ScriptObject};
use crate::operators::{OperatorCalculator, OperatorRegistry};
use crate::scope::{BlockScope, LogicalThread, ScopeArena, ScopeId, ThreadArena, ThreadId};
use crate::value::{PendingId, Value};

/// Where an identifier resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLocation {
    /// A block or captured closure scope.
    Block(ScopeId),
    /// The local-variable container.
    Local,
    /// The application container.
    App,
    /// The global container.
    Global,
}

/// Session state shared by every thread and processor of one evaluation.
pub struct EvaluationContext {
    global: Rc<RefCell<ScriptObject>>,
    app: Rc<RefCell<ScriptObject>>,
    local: Rc<RefCell<ScriptObject>>,
    scopes: ScopeArena,
    threads: ThreadArena,
    operators: OperatorRegistry,
    config: EngineConfig,
    gc: GarbageCollector,
    next_pending: u64,
    call_depth: usize,
}

impl EvaluationContext {
    /// Create a session with empty containers.
    pub fn new(config: EngineConfig) -> Self {
        EvaluationContext {
            global: Rc::new(RefCell::new(ScriptObject::new())),
            app: Rc::new(RefCell::new(ScriptObject::new())),
            local: Rc::new(RefCell::new(ScriptObject::new())),
            scopes: ScopeArena::new(),
            threads: ThreadArena::new(),
            operators: OperatorRegistry::new(),
            gc: GarbageCollector::with_threshold(config.gc_threshold),
            config,
            next_pending: 0,
            call_depth: 0,
        }
    }

    /// Create a session with the built-in globals installed.
    pub fn with_builtins(config: EngineConfig) -> Self {
        let mut ctx = Self::new(config);
        crate::builtins::install(&mut ctx);
        ctx
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The global container.
    pub fn global(&self) -> &Rc<RefCell<ScriptObject>> {
        &self.global
    }

    /// The application container.
    pub fn app_context(&self) -> &Rc<RefCell<ScriptObject>> {
        &self.app
    }

    /// The local-variable container.
    pub fn local_context(&self) -> &Rc<RefCell<ScriptObject>> {
        &self.local
    }

    /// Define (or overwrite) a global.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global.borrow_mut().set(name, value);
    }

    /// Define a host function as a global.
    pub fn define_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value> + 'static,
    {
        self.define_global(name, Value::function(Function::native(name, func)));
    }

    /// Register the operator calculator of a domain value type.
    pub fn register_calculator(&mut self, tag: &str, calculator: Rc<dyn OperatorCalculator>) {
        self.operators.register(tag, calculator);
    }

    /// Operator registry.
    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// Scope arena.
    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    /// Create a stand-alone thread.
    pub fn create_thread(&mut self) -> ThreadId {
        self.threads.insert(LogicalThread::default())
    }

    /// Create a thread whose lookups fall back to `parent`.
    pub fn create_child_thread(&mut self, parent: ThreadId) -> ThreadId {
        self.threads.insert(LogicalThread {
            parent: Some(parent),
            ..LogicalThread::default()
        })
    }

    /// Create the thread running a closure body.
    pub(crate) fn create_call_thread(&mut self, parent: ThreadId, closures: Rc<[ScopeId]>) -> ThreadId {
        self.threads.insert(LogicalThread {
            closures,
            parent: Some(parent),
            ..LogicalThread::default()
        })
    }

    /// Drop a thread and release its open blocks.
    pub fn release_thread(&mut self, id: ThreadId) -> Option<LogicalThread> {
        let thread = self.threads.remove(id)?;
        for scope in thread.blocks.iter().rev() {
            self.scopes.release(*scope);
        }
        Some(thread)
    }

    /// Get a thread.
    pub fn thread(&self, id: ThreadId) -> ScriptResult<&LogicalThread> {
        self.threads
            .get(id)
            .ok_or_else(|| ScriptError::internal(format!("unknown thread {:?}", id)))
    }

    /// Get a mutable thread.
    pub fn thread_mut(&mut self, id: ThreadId) -> ScriptResult<&mut LogicalThread> {
        self.threads
            .get_mut(id)
            .ok_or_else(|| ScriptError::internal(format!("unknown thread {:?}", id)))
    }

    /// Open a block scope on a thread.
    pub fn push_block(&mut self, thread: ThreadId) -> ScriptResult<ScopeId> {
        let scope = self.scopes.alloc(BlockScope::new());
        self.gc.track();
        if self.gc.should_collect() {
            log::debug!("[GC] {} scope allocations since last collection", self.gc.stats(&self.scopes).allocations_since_gc);
        }
        self.thread_mut(thread)?.blocks.push(scope);
        Ok(scope)
    }

    /// Close the innermost block scope of a thread.
    pub fn pop_block(&mut self, thread: ThreadId) -> ScriptResult<()> {
        if let Some(scope) = self.thread_mut(thread)?.blocks.pop() {
            self.scopes.release(scope);
        }
        Ok(())
    }

    /// Replace the innermost block with a copy of itself, so closures
    /// created before keep the old bindings.
    pub fn renew_block(&mut self, thread: ThreadId) -> ScriptResult<()> {
        let Some(current) = self.thread(thread)?.blocks.last().copied() else {
            return Ok(());
        };
        let copy = self.scopes.get(current).cloned().unwrap_or_default();
        self.pop_block(thread)?;
        let scope = self.scopes.alloc(copy);
        self.gc.track();
        self.thread_mut(thread)?.blocks.push(scope);
        Ok(())
    }

    /// Number of open blocks on a thread.
    pub fn block_depth(&self, thread: ThreadId) -> usize {
        self.threads.get(thread).map(|t| t.blocks.len()).unwrap_or(0)
    }

    /// Close blocks until the thread has `depth` of them.
    pub fn truncate_blocks(&mut self, thread: ThreadId, depth: usize) -> ScriptResult<()> {
        while self.block_depth(thread) > depth {
            self.pop_block(thread)?;
        }
        Ok(())
    }

    /// Innermost block, opening a root block when the thread has none.
    fn innermost_block(&mut self, thread: ThreadId) -> ScriptResult<ScopeId> {
        match self.thread(thread)?.blocks.last() {
            Some(scope) => Ok(*scope),
            None => self.push_block(thread),
        }
    }

    /// Declare a binding in the thread's innermost block.
    pub fn declare(&mut self, thread: ThreadId, name: &str, value: Value, constant: bool) -> ScriptResult<()> {
        let scope = self.innermost_block(thread)?;
        let block = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| ScriptError::internal("block scope was released"))?;
        block.declare(name, value, constant);
        Ok(())
    }

    /// Declare a `var` binding in the thread's outermost block.
    pub fn declare_var(&mut self, thread: ThreadId, name: &str, value: Value) -> ScriptResult<()> {
        let scope = match self.thread(thread)?.blocks.first() {
            Some(scope) => *scope,
            None => self.push_block(thread)?,
        };
        let block = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| ScriptError::internal("block scope was released"))?;
        block.declare(name, value, false);
        Ok(())
    }

    /// Find the container binding `name`, searching outward from `thread`.
    pub fn resolve(&self, thread: ThreadId, name: &str, global: bool) -> Option<BindingLocation> {
        if !global {
            let mut current = Some(thread);
            while let Some(id) = current {
                let thread = self.threads.get(id)?;
                let scopes = thread.blocks.iter().rev().chain(thread.closures.iter().rev());
                for scope in scopes {
                    if self.scopes.get(*scope).map(|s| s.has(name)).unwrap_or(false) {
                        return Some(BindingLocation::Block(*scope));
                    }
                }
                current = thread.parent;
            }
            if self.local.borrow().has(name) {
                return Some(BindingLocation::Local);
            }
            if self.app.borrow().has(name) {
                return Some(BindingLocation::App);
            }
        }
        if self.global.borrow().has(name) {
            return Some(BindingLocation::Global);
        }
        None
    }

    /// Read an identifier; unresolved names read as undefined.
    pub fn lookup(&self, thread: ThreadId, name: &str) -> Value {
        match self.resolve(thread, name, false) {
            Some(location) => self.read_binding(location, name),
            None => Value::Undefined,
        }
    }

    /// Read a resolved binding.
    pub fn read_binding(&self, location: BindingLocation, name: &str) -> Value {
        match location {
            BindingLocation::Block(scope) => self
                .scopes
                .get(scope)
                .and_then(|s| s.get(name).cloned())
                .unwrap_or_default(),
            BindingLocation::Local => self.local.borrow().get(name),
            BindingLocation::App => self.app.borrow().get(name),
            BindingLocation::Global => self.global.borrow().get(name),
        }
    }

    /// Fail with a TypeError when the binding is `const`.
    pub fn ensure_writable(&self, location: BindingLocation, name: &str) -> ScriptResult<()> {
        if self.is_const(location, name) {
            return Err(ScriptError::type_error(format!(
                "Assignment to constant variable '{}'",
                name
            )));
        }
        Ok(())
    }

    /// Check whether a resolved binding is `const`.
    pub fn is_const(&self, location: BindingLocation, name: &str) -> bool {
        match location {
            BindingLocation::Block(scope) => self
                .scopes
                .get(scope)
                .map(|s| s.is_const(name))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Write a resolved binding, rejecting `const` targets.
    pub fn write_binding(&mut self, location: BindingLocation, name: &str, value: Value) -> ScriptResult<()> {
        self.ensure_writable(location, name)?;
        match location {
            BindingLocation::Block(scope) => {
                let block = self
                    .scopes
                    .get_mut(scope)
                    .ok_or_else(|| ScriptError::internal("block scope was released"))?;
                block.set(name, value);
            }
            BindingLocation::Local => self.local.borrow_mut().set(name, value),
            BindingLocation::App => self.app.borrow_mut().set(name, value),
            BindingLocation::Global => self.global.borrow_mut().set(name, value),
        }
        Ok(())
    }

    /// Assign to an identifier; the name must already be bound somewhere.
    pub fn assign(&mut self, thread: ThreadId, name: &str, value: Value) -> ScriptResult<()> {
        match self.resolve(thread, name, false) {
            Some(location) => self.write_binding(location, name, value),
            None => Err(ScriptError::reference(format!("{} is not defined", name))),
        }
    }

    /// Mark every scope of a chain as captured by a closure.
    pub(crate) fn capture(&mut self, chain: &[ScopeId]) {
        for scope in chain {
            self.scopes.mark_captured(*scope);
        }
    }

    /// Allocate a handle for an externally supplied result.
    pub fn create_pending(&mut self) -> Value {
        self.next_pending += 1;
        Value::Pending(PendingId(self.next_pending))
    }

    /// Enter a nested function call.
    pub(crate) fn enter_call(&mut self) -> ScriptResult<()> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(ScriptError::range("Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        Ok(())
    }

    /// Leave a nested function call.
    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Reclaim captured scopes no longer reachable from a live thread,
    /// a container or `extra_roots`.
    pub fn collect_garbage(&mut self, extra_roots: &[Value]) -> usize {
        let mut root_scopes = Vec::new();
        let mut root_values = vec![
            Value::Object(self.global.clone()),
            Value::Object(self.app.clone()),
            Value::Object(self.local.clone()),
        ];
        for thread in self.threads.iter() {
            root_scopes.extend(thread.blocks.iter().copied());
            root_scopes.extend(thread.closures.iter().copied());
            root_values.extend(thread.return_value.iter().cloned());
        }
        root_values.extend(extra_roots.iter().cloned());
        self.gc.collect(&mut self.scopes, &root_scopes, &root_values)
    }

    /// Scope collection statistics.
    pub fn gc_stats(&self) -> GcStats {
        self.gc.stats(&self.scopes)
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        let mut ctx = EvaluationContext::default();
        ctx.define_global("x", Value::from("global"));
        ctx.app_context().borrow_mut().set("x", Value::from("app"));
        ctx.local_context().borrow_mut().set("x", Value::from("local"));

        let parent = ctx.create_thread();
        let child = ctx.create_child_thread(parent);
        assert_eq!(ctx.lookup(child, "x").to_display_string(), "local");

        ctx.declare(parent, "x", Value::from("parent"), false).unwrap();
        assert_eq!(ctx.lookup(child, "x").to_display_string(), "parent");

        ctx.declare(child, "x", Value::from("child"), false).unwrap();
        assert_eq!(ctx.lookup(child, "x").to_display_string(), "child");

        assert_eq!(ctx.resolve(child, "x", true), Some(BindingLocation::Global));
        assert!(ctx.lookup(child, "missing").is_undefined());
    }

    #[test]
    fn test_assignment_rules() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        ctx.declare(thread, "c", Value::from(3), true).unwrap();

        let err = ctx.assign(thread, "c", Value::from(4)).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
        assert_eq!(ctx.lookup(thread, "c").to_number(), 3.0);

        let err = ctx.assign(thread, "nowhere", Value::from(1)).unwrap_err();
        assert!(matches!(err, ScriptError::Reference(_)));
        assert!(!ctx.global().borrow().has("nowhere"));

        ctx.define_global("g", Value::from(1));
        ctx.assign(thread, "g", Value::from(2)).unwrap();
        assert_eq!(ctx.global().borrow().get("g").to_number(), 2.0);
    }

    #[test]
    fn test_release_thread_frees_blocks() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        ctx.push_block(thread).unwrap();
        ctx.push_block(thread).unwrap();
        assert_eq!(ctx.scopes().len(), 2);
        ctx.release_thread(thread);
        assert!(ctx.scopes().is_empty());
    }

    #[test]
    fn test_pending_ids_are_unique() {
        let mut ctx = EvaluationContext::default();
        let a = ctx.create_pending();
        let b = ctx.create_pending();
        assert!(!a.strict_equals(&b));
    }
}
