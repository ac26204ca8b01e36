//! Statement queue processors.
//!
//! A `StatementProcessor` unrolls a statement list into an explicit queue
//! of `QueueItem`s and steps through it. Abrupt completions (`break`,
//! `continue`, `return`, `throw`) unwind the queue until a matching target
//! item. In `Async` mode expressions containing calls are split into
//! tasks and script functions run on the same queue, so a host function
//! returning a pending value suspends the whole processor at that point;
//! `resume` continues exactly where it stopped. `Sync` mode shares the
//! statement decomposition but evaluates expressions immediately.

use std::collections::VecDeque;

use serde::Serialize;

use crate::ast::{
    ArrowBody, Expr, ExprKind, ExprRef, ForBinding, ForInit, ObjectProperty, PropertyName,
    StmtKind, StmtList, StmtRef, SwitchStmt, VarDecl, VarKind,
};
use crate::context::EvaluationContext;
use crate::error::{ScriptError, ScriptResult};
use crate::eval::{
    bind_pattern, build_template, delete_place, ensure_writable, flatten_spreads, for_in_keys,
    get_member, identifier_place, iterate_values, make_closure, property_place, read_place,
    short_circuits, spread_into, update_place, write_place, BindMode, Place,
};
use crate::interpreter::{bind_call_frame, Interpreter};
use crate::object::{Function, PropertyKey, ScriptObject};
use crate::queue::{Completion, ExprTask, QueueItem, StackDepth};
use crate::scope::ThreadId;
use crate::value::{PendingId, Value};

/// Execution mode of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorMode {
    /// Never suspends; expressions are evaluated in one step.
    Sync,
    /// Suspends when a host function returns a pending value.
    Async,
}

/// Lifecycle of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorState {
    Ready,
    /// Waiting for the host to resolve a pending value.
    Suspended(PendingId),
    Completed,
}

/// Counters collected while stepping the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub processed_statements: usize,
    /// Highest iteration count reached by any loop.
    pub max_loops: usize,
    /// Deepest block stack seen on any thread.
    pub max_blocks: usize,
    pub max_queue_length: usize,
    /// Abrupt completions stopped by a break or continue target.
    pub clear_to_labels: usize,
    /// Items inserted at the front of the queue.
    pub unshifted_items: usize,
}

/// Serializable view of a processor between steps.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub mode: ProcessorMode,
    pub state: ProcessorState,
    pub awaiting: Option<PendingId>,
    pub queue: Vec<String>,
    pub values: Vec<Value>,
    pub receivers: usize,
    pub places: usize,
    /// Threads of the script function calls currently running on the queue.
    pub frames: Vec<ThreadId>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy)]
struct CallFrame {
    thread: ThreadId,
}

/// Steppable executor for one statement list on one thread.
pub struct StatementProcessor {
    mode: ProcessorMode,
    root_thread: ThreadId,
    queue: VecDeque<QueueItem>,
    values: Vec<Value>,
    /// Receivers of pending method calls.
    receivers: Vec<Value>,
    places: Vec<Place>,
    frames: Vec<CallFrame>,
    state: ProcessorState,
    completion_value: Value,
    diagnostics: Diagnostics,
    started: bool,
    /// Blocks open on the root thread once the run has started.
    root_depth: usize,
}

impl StatementProcessor {
    /// Queue `statements` for execution on `thread`.
    pub fn new(mode: ProcessorMode, thread: ThreadId, statements: StmtList) -> Self {
        let mut queue = VecDeque::with_capacity(statements.len() + 1);
        queue.push_back(QueueItem::Hoist(statements.clone()));
        queue.extend(statements.iter().cloned().map(QueueItem::Statement));
        StatementProcessor {
            mode,
            root_thread: thread,
            queue,
            values: Vec::new(),
            receivers: Vec::new(),
            places: Vec::new(),
            frames: Vec::new(),
            state: ProcessorState::Ready,
            completion_value: Value::Undefined,
            diagnostics: Diagnostics::default(),
            started: false,
            root_depth: 0,
        }
    }

    pub fn mode(&self) -> ProcessorMode {
        self.mode
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Thread the statements run on.
    pub fn thread(&self) -> ThreadId {
        self.root_thread
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Value of the last top-level expression statement.
    pub fn completion_value(&self) -> &Value {
        &self.completion_value
    }

    /// Value of a top-level `return`, undefined if none ran.
    pub fn return_value(&self, ctx: &EvaluationContext) -> Value {
        ctx.thread(self.root_thread)
            .ok()
            .and_then(|thread| thread.return_value.clone())
            .unwrap_or_default()
    }

    /// Step the queue until it is empty or the processor suspends.
    pub fn run(&mut self, ctx: &mut EvaluationContext) -> ScriptResult<ProcessorState> {
        if self.state != ProcessorState::Ready {
            return Ok(self.state);
        }
        if !self.started {
            self.started = true;
            if ctx.block_depth(self.root_thread) == 0 {
                ctx.push_block(self.root_thread)?;
            }
            self.root_depth = ctx.block_depth(self.root_thread);
            ctx.thread_mut(self.root_thread)?.return_value = None;
        }

        while let Some(item) = self.queue.pop_front() {
            if let Err(error) = self.step(ctx, item) {
                if let Err(error) = self.unwind(ctx, Completion::Throw(error)) {
                    self.abort(ctx);
                    return Err(error);
                }
            }
            self.diagnostics.max_queue_length = self.diagnostics.max_queue_length.max(self.queue.len());
            if let ProcessorState::Suspended(id) = self.state {
                log::debug!(
                    "[Script Queue] suspended awaiting {:?}, {} steps queued",
                    id,
                    self.queue.len()
                );
                return Ok(self.state);
            }
        }

        self.state = ProcessorState::Completed;
        log::trace!(
            "[Script Queue] completed after {} statements",
            self.diagnostics.processed_statements
        );
        Ok(self.state)
    }

    /// Deliver the outcome of the pending value the processor waits for
    /// and continue running.
    pub fn resume(
        &mut self,
        ctx: &mut EvaluationContext,
        id: PendingId,
        outcome: Result<Value, Value>,
    ) -> ScriptResult<ProcessorState> {
        if self.state != ProcessorState::Suspended(id) {
            return Err(ScriptError::internal(format!(
                "processor is not awaiting {:?}",
                id
            )));
        }
        log::debug!("[Script Queue] resuming {:?}", id);
        self.state = ProcessorState::Ready;
        match outcome {
            Ok(value) => self.values.push(value),
            Err(thrown) => {
                if let Err(error) = self.unwind(ctx, Completion::Throw(ScriptError::Thrown(thrown))) {
                    self.abort(ctx);
                    return Err(error);
                }
            }
        }
        self.run(ctx)
    }

    /// Inspectable copy of the processor's position.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            mode: self.mode,
            state: self.state,
            awaiting: match self.state {
                ProcessorState::Suspended(id) => Some(id),
                _ => None,
            },
            queue: self.queue.iter().map(QueueItem::describe).collect(),
            values: self.values.clone(),
            receivers: self.receivers.len(),
            places: self.places.len(),
            frames: self.frames.iter().map(|f| f.thread).collect(),
            diagnostics: self.diagnostics,
        }
    }

    /// Values held by the queue and its stacks; pass them to
    /// `EvaluationContext::collect_garbage` while the processor is alive.
    pub fn live_values(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.values.iter().chain(self.receivers.iter()).cloned().collect();
        roots.push(self.completion_value.clone());
        for place in &self.places {
            if let Place::Property { object, .. } = place {
                roots.push(object.clone());
            }
        }
        for item in &self.queue {
            match item {
                QueueItem::Push(value) => roots.push(value.clone()),
                QueueItem::ForEachNext { items, .. } => roots.extend(items.iter().cloned()),
                QueueItem::Resume(Completion::Return(value)) => roots.push(value.clone()),
                QueueItem::Resume(Completion::Throw(ScriptError::Thrown(value))) => roots.push(value.clone()),
                _ => {}
            }
        }
        roots
    }

    // ── Stepping ─────────────────────────────────────────────────────

    fn current_thread(&self) -> ThreadId {
        self.frames.last().map(|f| f.thread).unwrap_or(self.root_thread)
    }

    fn step(&mut self, ctx: &mut EvaluationContext, item: QueueItem) -> ScriptResult<()> {
        let thread = self.current_thread();
        match item {
            QueueItem::Statement(stmt) => {
                self.diagnostics.processed_statements += 1;
                let items = self.expand_statement(&stmt);
                self.push_front(items);
            }
            QueueItem::EnterBlock(body) => {
                ctx.push_block(thread)?;
                self.diagnostics.max_blocks = self.diagnostics.max_blocks.max(ctx.block_depth(thread));
                if let Some(body) = body {
                    hoist(ctx, thread, &body)?;
                }
            }
            QueueItem::ExitBlock => ctx.pop_block(thread)?,
            QueueItem::Hoist(body) => hoist(ctx, thread, &body)?,
            QueueItem::Eval(expr) => self.eval(ctx, &expr)?,
            QueueItem::Task(task) => self.run_task(ctx, task)?,
            QueueItem::Push(value) => self.values.push(value),
            QueueItem::Discard => {
                self.pop_value()?;
            }
            QueueItem::Complete => {
                let value = self.pop_value()?;
                if self.frames.is_empty() {
                    self.completion_value = value;
                }
            }
            QueueItem::Declare { kind, pattern } => {
                let value = self.pop_value()?;
                let mode = match kind {
                    VarKind::Var => BindMode::DeclareVar,
                    VarKind::Let => BindMode::Declare { constant: false },
                    VarKind::Const => BindMode::Declare { constant: true },
                };
                bind_pattern(ctx, thread, &pattern, value, mode)?;
            }
            QueueItem::Branch {
                consequent,
                alternate,
            } => {
                if self.pop_value()?.to_boolean() {
                    self.push_front(vec![QueueItem::Statement(consequent)]);
                } else if let Some(alternate) = alternate {
                    self.push_front(vec![QueueItem::Statement(alternate)]);
                }
            }
            QueueItem::LoopTest {
                stmt,
                label,
                iteration,
            } => self.loop_test(ctx, stmt, label, iteration)?,
            QueueItem::RenewScope => ctx.renew_block(thread)?,
            QueueItem::ForEachStart { stmt, label } => {
                let iterable = self.pop_value()?;
                let items = match &stmt.kind {
                    StmtKind::ForIn(_) => for_in_keys(&iterable),
                    StmtKind::ForOf(_) => iterate_values(&iterable)?,
                    _ => return Err(mismatch("for-each")),
                };
                self.push_front(vec![QueueItem::ForEachNext {
                    stmt,
                    label,
                    items: items.into(),
                    index: 0,
                }]);
            }
            QueueItem::ForEachNext {
                stmt,
                label,
                items,
                index,
            } => {
                let Some(item) = items.get(index).cloned() else {
                    return Ok(());
                };
                self.count_iteration(ctx, index + 1)?;
                let (StmtKind::ForIn(each) | StmtKind::ForOf(each)) = &stmt.kind else {
                    return Err(mismatch("for-each"));
                };
                let depth = self.depth();
                let mut queued = vec![QueueItem::EnterBlock(None), QueueItem::Push(item)];
                match &each.binding {
                    ForBinding::Declared { kind, pattern } => queued.push(QueueItem::Declare {
                        kind: *kind,
                        pattern: pattern.clone(),
                    }),
                    ForBinding::Target(target) => {
                        queued.extend(place_items(target, "Invalid left-hand side in for-loop")?);
                        queued.push(QueueItem::Task(ExprTask::Assign));
                        queued.push(QueueItem::Discard);
                    }
                }
                queued.push(QueueItem::Statement(each.body.clone()));
                queued.push(QueueItem::ExitBlock);
                queued.push(QueueItem::ContinueTarget {
                    label: label.clone(),
                    depth,
                });
                queued.push(QueueItem::ForEachNext {
                    stmt: stmt.clone(),
                    label,
                    items,
                    index: index + 1,
                });
                self.push_front(queued);
            }
            QueueItem::SwitchDispatch { stmt, index } => {
                let switch = switch_of(&stmt)?;
                match switch.cases.get(index) {
                    Some(case) => match &case.test {
                        Some(test) => self.push_front(vec![
                            QueueItem::Eval(test.clone()),
                            QueueItem::SwitchCompare {
                                stmt: stmt.clone(),
                                index,
                            },
                        ]),
                        None => self.push_front(vec![QueueItem::SwitchDispatch {
                            stmt: stmt.clone(),
                            index: index + 1,
                        }]),
                    },
                    None => {
                        self.pop_value()?;
                        if let Some(default) = switch.cases.iter().position(|c| c.test.is_none()) {
                            self.push_front(case_bodies(switch, default));
                        }
                    }
                }
            }
            QueueItem::SwitchCompare { stmt, index } => {
                let switch = switch_of(&stmt)?;
                let test = self.pop_value()?;
                let matched = self
                    .values
                    .last()
                    .map(|discriminant| discriminant.strict_equals(&test))
                    .ok_or_else(underflow)?;
                if matched {
                    self.pop_value()?;
                    self.push_front(case_bodies(switch, index));
                } else {
                    self.push_front(vec![QueueItem::SwitchDispatch {
                        stmt: stmt.clone(),
                        index: index + 1,
                    }]);
                }
            }
            QueueItem::BreakTarget { .. } | QueueItem::ContinueTarget { .. } => {}
            QueueItem::TryEnd { finalizer, .. } => {
                if let Some(finalizer) = finalizer {
                    self.push_front(block_items(&finalizer));
                }
            }
            QueueItem::BindCatch(param) => {
                let value = self.pop_value()?;
                if let Some(param) = param {
                    bind_pattern(ctx, thread, &param, value, BindMode::Declare { constant: false })?;
                }
            }
            QueueItem::Resume(completion) => return self.unwind(ctx, completion),
            QueueItem::Throw => {
                let value = self.pop_value()?;
                return self.unwind(ctx, Completion::Throw(ScriptError::Thrown(value)));
            }
            QueueItem::Return => {
                let value = self.pop_value()?;
                return self.unwind(ctx, Completion::Return(value));
            }
            QueueItem::FunctionExit { depth } => {
                self.leave_frame(ctx, depth);
                self.values.push(Value::Undefined);
            }
        }
        Ok(())
    }

    /// Drop queued items until one handles `completion`.
    fn unwind(&mut self, ctx: &mut EvaluationContext, completion: Completion) -> ScriptResult<()> {
        log::trace!("[Script Queue] unwinding {}", completion.describe());
        while let Some(item) = self.queue.pop_front() {
            match item {
                QueueItem::ExitBlock => ctx.pop_block(self.current_thread())?,
                QueueItem::BreakTarget {
                    label,
                    breakable,
                    depth,
                } => {
                    if completion.breaks_at(label.as_deref(), breakable) {
                        self.restore(depth);
                        self.diagnostics.clear_to_labels += 1;
                        return Ok(());
                    }
                }
                QueueItem::ContinueTarget { label, depth } => {
                    if completion.continues_at(label.as_deref()) {
                        self.restore(depth);
                        self.diagnostics.clear_to_labels += 1;
                        return Ok(());
                    }
                }
                QueueItem::TryEnd {
                    handler,
                    finalizer,
                    depth,
                } => {
                    if let (Completion::Throw(error), Some(handler)) = (&completion, handler) {
                        self.restore(depth);
                        let mut items = vec![
                            QueueItem::EnterBlock(Some(handler.body.clone())),
                            QueueItem::Push(error.to_value()),
                            QueueItem::BindCatch(handler.param.clone()),
                        ];
                        items.extend(handler.body.iter().cloned().map(QueueItem::Statement));
                        items.push(QueueItem::ExitBlock);
                        items.push(QueueItem::TryEnd {
                            handler: None,
                            finalizer,
                            depth,
                        });
                        self.push_front(items);
                        return Ok(());
                    }
                    if let Some(finalizer) = finalizer {
                        self.restore(depth);
                        let mut items = block_items(&finalizer);
                        items.push(QueueItem::Resume(completion));
                        self.push_front(items);
                        return Ok(());
                    }
                }
                QueueItem::FunctionExit { depth } => {
                    self.leave_frame(ctx, depth);
                    match &completion {
                        Completion::Return(value) => {
                            self.values.push(value.clone());
                            return Ok(());
                        }
                        Completion::Throw(_) => {}
                        other => {
                            return Err(ScriptError::internal(format!(
                                "{} crossed a function boundary",
                                other.describe()
                            )))
                        }
                    }
                }
                _ => {}
            }
        }

        match completion {
            Completion::Return(value) => {
                ctx.thread_mut(self.root_thread)?.return_value = Some(value);
                Ok(())
            }
            Completion::Throw(error) => Err(error),
            other => Err(ScriptError::internal(format!(
                "unhandled {}",
                other.describe()
            ))),
        }
    }

    fn abort(&mut self, ctx: &mut EvaluationContext) {
        while let Some(frame) = self.frames.pop() {
            ctx.release_thread(frame.thread);
            ctx.exit_call();
        }
        self.queue.clear();
        if let Err(error) = ctx.truncate_blocks(self.root_thread, self.root_depth) {
            log::warn!("[Script Queue] could not close aborted blocks: {}", error);
        }
        self.state = ProcessorState::Completed;
    }

    fn leave_frame(&mut self, ctx: &mut EvaluationContext, depth: StackDepth) {
        if let Some(frame) = self.frames.pop() {
            ctx.release_thread(frame.thread);
            ctx.exit_call();
        }
        self.restore(depth);
    }

    // ── Statements ───────────────────────────────────────────────────

    fn expand_statement(&self, stmt: &StmtRef) -> Vec<QueueItem> {
        let depth = self.depth();
        match &stmt.kind {
            StmtKind::Empty | StmtKind::Function(_) | StmtKind::Import(_) => Vec::new(),
            StmtKind::Block(body) => block_items(body),
            StmtKind::Expression(expr) => vec![QueueItem::Eval(expr.clone()), QueueItem::Complete],
            StmtKind::Declaration(decl) => declaration_items(decl),
            StmtKind::If(s) => vec![
                QueueItem::Eval(s.test.clone()),
                QueueItem::Branch {
                    consequent: s.consequent.clone(),
                    alternate: s.alternate.clone(),
                },
            ],
            StmtKind::While(_)
            | StmtKind::DoWhile(_)
            | StmtKind::For(_)
            | StmtKind::ForIn(_)
            | StmtKind::ForOf(_) => loop_items(stmt, None, depth),
            StmtKind::Switch(_) => switch_items(stmt, None, depth),
            StmtKind::Break(label) => vec![QueueItem::Resume(Completion::Break(label.clone()))],
            StmtKind::Continue(label) => vec![QueueItem::Resume(Completion::Continue(label.clone()))],
            StmtKind::Throw(expr) => vec![QueueItem::Eval(expr.clone()), QueueItem::Throw],
            StmtKind::Return(expr) => vec![
                expr.clone()
                    .map(QueueItem::Eval)
                    .unwrap_or(QueueItem::Push(Value::Undefined)),
                QueueItem::Return,
            ],
            StmtKind::Try(s) => {
                let mut items = block_items(&s.block);
                items.push(QueueItem::TryEnd {
                    handler: s.handler.clone(),
                    finalizer: s.finalizer.clone(),
                    depth,
                });
                items
            }
            StmtKind::Labeled(labeled) => {
                let label = Some(labeled.label.clone());
                match &labeled.body.kind {
                    StmtKind::While(_)
                    | StmtKind::DoWhile(_)
                    | StmtKind::For(_)
                    | StmtKind::ForIn(_)
                    | StmtKind::ForOf(_) => loop_items(&labeled.body, label, depth),
                    StmtKind::Switch(_) => switch_items(&labeled.body, label, depth),
                    _ => vec![
                        QueueItem::Statement(labeled.body.clone()),
                        QueueItem::BreakTarget {
                            label,
                            breakable: false,
                            depth,
                        },
                    ],
                }
            }
        }
    }

    fn loop_test(
        &mut self,
        ctx: &EvaluationContext,
        stmt: StmtRef,
        label: Option<String>,
        iteration: usize,
    ) -> ScriptResult<()> {
        if !self.pop_value()?.to_boolean() {
            return Ok(());
        }
        self.count_iteration(ctx, iteration)?;
        let depth = self.depth();
        let next = QueueItem::LoopTest {
            stmt: stmt.clone(),
            label: label.clone(),
            iteration: iteration + 1,
        };
        let items = match &stmt.kind {
            StmtKind::While(w) | StmtKind::DoWhile(w) => vec![
                QueueItem::Statement(w.body.clone()),
                QueueItem::ContinueTarget { label, depth },
                QueueItem::Eval(w.test.clone()),
                next,
            ],
            StmtKind::For(f) => {
                let mut items = vec![
                    QueueItem::Statement(f.body.clone()),
                    QueueItem::ContinueTarget { label, depth },
                ];
                if matches!(&f.init, Some(ForInit::Declaration(decl)) if decl.kind == VarKind::Let) {
                    items.push(QueueItem::RenewScope);
                }
                if let Some(update) = &f.update {
                    items.push(QueueItem::Eval(update.clone()));
                    items.push(QueueItem::Discard);
                }
                items.push(for_test(&f.test));
                items.push(next);
                items
            }
            _ => return Err(mismatch("loop test")),
        };
        self.push_front(items);
        Ok(())
    }

    fn count_iteration(&mut self, ctx: &EvaluationContext, iteration: usize) -> ScriptResult<()> {
        let limit = ctx.config().max_loop_iterations;
        if limit > 0 && iteration > limit {
            return Err(ScriptError::range(format!(
                "Loop exceeded {} iterations",
                limit
            )));
        }
        self.diagnostics.max_loops = self.diagnostics.max_loops.max(iteration);
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn eval(&mut self, ctx: &mut EvaluationContext, expr: &ExprRef) -> ScriptResult<()> {
        if self.mode == ProcessorMode::Sync || !contains_call(expr) {
            let value = Interpreter::new(ctx, self.current_thread()).evaluate(expr)?;
            self.values.push(value);
            return Ok(());
        }
        let items = expand_expression(expr)?;
        self.push_front(items);
        Ok(())
    }

    fn run_task(&mut self, ctx: &mut EvaluationContext, task: ExprTask) -> ScriptResult<()> {
        let thread = self.current_thread();
        match task {
            ExprTask::Template(expr) => {
                let ExprKind::Template(template) = &expr.kind else {
                    return Err(mismatch("template"));
                };
                let values = self.pop_values(template.expressions.len())?;
                self.values.push(build_template(&template.quasis, &values));
            }
            ExprTask::Unary(op) => {
                let operand = self.pop_value()?;
                let value = ctx.operators().apply_unary(op, &operand)?;
                self.values.push(value);
            }
            ExprTask::Binary(op) => {
                let right = self.pop_value()?;
                let left = self.pop_value()?;
                let value = ctx.operators().apply_binary(op, &left, &right)?;
                self.values.push(value);
            }
            ExprTask::Logical(expr) => {
                let ExprKind::Binary(binary) = &expr.kind else {
                    return Err(mismatch("logical"));
                };
                let left = self.values.last().ok_or_else(underflow)?;
                if !short_circuits(binary.operator, left) {
                    self.pop_value()?;
                    self.push_front(vec![QueueItem::Eval(binary.right.clone())]);
                }
            }
            ExprTask::Conditional(expr) => {
                let ExprKind::Conditional(conditional) = &expr.kind else {
                    return Err(mismatch("conditional"));
                };
                let branch = if self.pop_value()?.to_boolean() {
                    conditional.consequent.clone()
                } else {
                    conditional.alternate.clone()
                };
                self.push_front(vec![QueueItem::Eval(branch)]);
            }
            ExprTask::IdentifierPlace(expr) => {
                let identifier = expr.as_identifier().ok_or_else(|| mismatch("identifier place"))?;
                self.places.push(identifier_place(ctx, thread, identifier));
            }
            ExprTask::MemberPlace(expr) => {
                let ExprKind::Member(member) = &expr.kind else {
                    return Err(mismatch("member place"));
                };
                let object = self.pop_value()?;
                self.places
                    .push(property_place(object, PropertyKey::from(member.property.as_str()))?);
            }
            ExprTask::ComputedPlace => {
                let key = self.pop_value()?.to_property_key();
                let object = self.pop_value()?;
                self.places.push(property_place(object, key)?);
            }
            ExprTask::Assign => {
                let value = self.pop_value()?;
                let place = self.pop_place()?;
                write_place(ctx, &place, value.clone())?;
                self.values.push(value);
            }
            ExprTask::EnsureWritable => {
                let place = self.places.last().ok_or_else(underflow)?;
                ensure_writable(ctx, place)?;
            }
            ExprTask::ReadPlace => {
                let place = self.places.last().ok_or_else(underflow)?;
                let value = read_place(ctx, place)?;
                self.values.push(value);
            }
            ExprTask::Compound(op) => {
                let right = self.pop_value()?;
                let current = self.pop_value()?;
                let place = self.pop_place()?;
                let value = ctx.operators().apply_binary(op, &current, &right)?;
                write_place(ctx, &place, value.clone())?;
                self.values.push(value);
            }
            ExprTask::LogicalAssign(expr) => {
                let ExprKind::Assignment(assignment) = &expr.kind else {
                    return Err(mismatch("logical assignment"));
                };
                let op = assignment
                    .operator
                    .binary()
                    .ok_or_else(|| mismatch("logical assignment"))?;
                let place = self.places.last().ok_or_else(underflow)?;
                let current = read_place(ctx, place)?;
                if short_circuits(op, &current) {
                    self.pop_place()?;
                    self.values.push(current);
                } else {
                    self.push_front(vec![
                        QueueItem::Eval(assignment.value.clone()),
                        QueueItem::Task(ExprTask::Assign),
                    ]);
                }
            }
            ExprTask::Update { op, prefix } => {
                let place = self.pop_place()?;
                let value = update_place(ctx, &place, op, prefix)?;
                self.values.push(value);
            }
            ExprTask::Delete => {
                let place = self.pop_place()?;
                let value = delete_place(ctx, &place)?;
                self.values.push(value);
            }
            ExprTask::Destructure(expr) => {
                let ExprKind::Destructure(destructure) = &expr.kind else {
                    return Err(mismatch("destructure"));
                };
                let value = self.values.last().cloned().ok_or_else(underflow)?;
                bind_pattern(ctx, thread, &destructure.pattern, value, BindMode::Assign)?;
            }
            ExprTask::GetMember { expr, method } => {
                let ExprKind::Member(member) = &expr.kind else {
                    return Err(mismatch("member"));
                };
                let object = self.pop_value()?;
                let key = PropertyKey::from(member.property.as_str());
                let value = get_member(&object, &key, member.optional)?;
                if method {
                    self.receivers.push(object);
                }
                self.values.push(value);
            }
            ExprTask::ComputedKey { expr, method } => {
                let ExprKind::CalculatedMember(member) = &expr.kind else {
                    return Err(mismatch("computed member"));
                };
                let nullish = self.values.last().ok_or_else(underflow)?.is_nullish();
                if member.optional && nullish {
                    let object = self.pop_value()?;
                    if method {
                        self.receivers.push(object);
                    }
                    self.values.push(Value::Undefined);
                } else {
                    self.push_front(vec![
                        QueueItem::Eval(member.property.clone()),
                        QueueItem::Task(ExprTask::GetComputed {
                            expr: expr.clone(),
                            method,
                        }),
                    ]);
                }
            }
            ExprTask::GetComputed { expr, method } => {
                let ExprKind::CalculatedMember(member) = &expr.kind else {
                    return Err(mismatch("computed member"));
                };
                let key = self.pop_value()?.to_property_key();
                let object = self.pop_value()?;
                let value = get_member(&object, &key, member.optional)?;
                if method {
                    self.receivers.push(object);
                }
                self.values.push(value);
            }
            ExprTask::PlainCallee => self.receivers.push(Value::Undefined),
            ExprTask::PrepareCall(expr) => {
                let ExprKind::Invocation(call) = &expr.kind else {
                    return Err(mismatch("call"));
                };
                let callee = self.values.last().ok_or_else(underflow)?;
                if call.optional && callee.is_nullish() {
                    self.pop_value()?;
                    self.pop_receiver()?;
                    self.values.push(Value::Undefined);
                } else if !callee.is_function() {
                    return Err(ScriptError::type_error(format!(
                        "{} is not a function",
                        call.callee.source()
                    )));
                } else {
                    let mut items: Vec<QueueItem> = call
                        .arguments
                        .iter()
                        .map(|argument| QueueItem::Eval(spread_operand(argument)))
                        .collect();
                    items.push(QueueItem::Task(ExprTask::Call(expr.clone())));
                    self.push_front(items);
                }
            }
            ExprTask::Call(expr) => {
                let ExprKind::Invocation(call) = &expr.kind else {
                    return Err(mismatch("call"));
                };
                let args = self.pop_values(call.arguments.len())?;
                let args = flatten_spreads(args, &spread_flags(&call.arguments))?;
                let callee = self.pop_value()?;
                let this = self.pop_receiver()?;
                self.invoke(ctx, callee, this, args)?;
            }
            ExprTask::BuildArray(expr) => {
                let ExprKind::Array(elements) = &expr.kind else {
                    return Err(mismatch("array"));
                };
                let values = self.pop_values(elements.len())?;
                let values = flatten_spreads(values, &spread_flags(elements))?;
                self.values.push(Value::array(values));
            }
            ExprTask::BuildObject(expr) => {
                let ExprKind::Object(properties) = &expr.kind else {
                    return Err(mismatch("object"));
                };
                let count = properties
                    .iter()
                    .map(|p| match p {
                        ObjectProperty::Property {
                            key: PropertyName::Computed(_),
                            ..
                        } => 2,
                        _ => 1,
                    })
                    .sum();
                let mut values = self.pop_values(count)?.into_iter();
                let mut object = ScriptObject::new();
                for property in properties {
                    match property {
                        ObjectProperty::Property { key, .. } => {
                            let name = match key {
                                PropertyName::Static(name) => name.clone(),
                                PropertyName::Computed(_) => values
                                    .next()
                                    .unwrap_or_default()
                                    .to_property_key()
                                    .to_name(),
                            };
                            object.set(name, values.next().unwrap_or_default());
                        }
                        ObjectProperty::Spread(_) => {
                            spread_into(&mut object, &values.next().unwrap_or_default());
                        }
                    }
                }
                self.values.push(Value::object(object));
            }
        }
        Ok(())
    }

    /// Call a function. In async mode script functions run on this queue
    /// inside a call frame; everything else is called immediately.
    fn invoke(
        &mut self,
        ctx: &mut EvaluationContext,
        callee: Value,
        this: Value,
        args: Vec<Value>,
    ) -> ScriptResult<()> {
        let thread = self.current_thread();
        if self.mode == ProcessorMode::Async {
            if let Some(Function::Closure(closure)) = callee.as_function().map(|f| f.as_ref()) {
                ctx.enter_call()?;
                let call_thread = ctx.create_call_thread(thread, closure.captured.clone());
                if let Err(error) = bind_call_frame(ctx, call_thread, &callee, closure, args) {
                    ctx.release_thread(call_thread);
                    ctx.exit_call();
                    return Err(error);
                }
                let depth = self.depth();
                self.frames.push(CallFrame { thread: call_thread });
                let mut items = match &closure.function.body {
                    ArrowBody::Expression(body) => vec![QueueItem::Eval(body.clone()), QueueItem::Return],
                    ArrowBody::Block(body) => {
                        let mut items = vec![QueueItem::Hoist(body.clone())];
                        items.extend(body.iter().cloned().map(QueueItem::Statement));
                        items.push(QueueItem::Push(Value::Undefined));
                        items.push(QueueItem::Return);
                        items
                    }
                };
                items.push(QueueItem::FunctionExit { depth });
                self.push_front(items);
                return Ok(());
            }
        }

        let result = Interpreter::new(ctx, thread).call_function(&callee, this, args)?;
        if let (ProcessorMode::Async, Value::Pending(id)) = (self.mode, &result) {
            self.state = ProcessorState::Suspended(*id);
            return Ok(());
        }
        self.values.push(result);
        Ok(())
    }

    // ── Stacks ───────────────────────────────────────────────────────

    fn push_front(&mut self, items: Vec<QueueItem>) {
        self.diagnostics.unshifted_items += items.len();
        for item in items.into_iter().rev() {
            self.queue.push_front(item);
        }
    }

    fn depth(&self) -> StackDepth {
        StackDepth {
            values: self.values.len(),
            receivers: self.receivers.len(),
            places: self.places.len(),
        }
    }

    fn restore(&mut self, depth: StackDepth) {
        self.values.truncate(depth.values);
        self.receivers.truncate(depth.receivers);
        self.places.truncate(depth.places);
    }

    fn pop_value(&mut self) -> ScriptResult<Value> {
        self.values.pop().ok_or_else(underflow)
    }

    fn pop_values(&mut self, count: usize) -> ScriptResult<Vec<Value>> {
        if self.values.len() < count {
            return Err(underflow());
        }
        Ok(self.values.split_off(self.values.len() - count))
    }

    fn pop_receiver(&mut self) -> ScriptResult<Value> {
        self.receivers.pop().ok_or_else(underflow)
    }

    fn pop_place(&mut self) -> ScriptResult<Place> {
        self.places.pop().ok_or_else(underflow)
    }
}

fn underflow() -> ScriptError {
    ScriptError::internal("statement queue stack underflow")
}

fn mismatch(task: &str) -> ScriptError {
    ScriptError::internal(format!("{} step on an unexpected node", task))
}

/// Declare the function declarations of a statement list.
fn hoist(ctx: &mut EvaluationContext, thread: ThreadId, body: &StmtList) -> ScriptResult<()> {
    for stmt in body.iter() {
        if let StmtKind::Function(decl) = &stmt.kind {
            let closure = make_closure(ctx, thread, &decl.function)?;
            ctx.declare(thread, &decl.name.name, closure, false)?;
        }
    }
    Ok(())
}

fn block_items(body: &StmtList) -> Vec<QueueItem> {
    let mut items = Vec::with_capacity(body.len() + 2);
    items.push(QueueItem::EnterBlock(Some(body.clone())));
    items.extend(body.iter().cloned().map(QueueItem::Statement));
    items.push(QueueItem::ExitBlock);
    items
}

fn declaration_items(decl: &VarDecl) -> Vec<QueueItem> {
    let mut items = Vec::with_capacity(decl.declarators.len() * 2);
    for declarator in &decl.declarators {
        items.push(match &declarator.init {
            Some(init) => QueueItem::Eval(init.clone()),
            None => QueueItem::Push(Value::Undefined),
        });
        items.push(QueueItem::Declare {
            kind: decl.kind,
            pattern: declarator.pattern.clone(),
        });
    }
    items
}

fn for_test(test: &Option<ExprRef>) -> QueueItem {
    match test {
        Some(test) => QueueItem::Eval(test.clone()),
        None => QueueItem::Push(Value::Boolean(true)),
    }
}

fn loop_items(stmt: &StmtRef, label: Option<String>, depth: StackDepth) -> Vec<QueueItem> {
    let target = QueueItem::BreakTarget {
        label: label.clone(),
        breakable: true,
        depth,
    };
    match &stmt.kind {
        StmtKind::While(w) => vec![
            QueueItem::Eval(w.test.clone()),
            QueueItem::LoopTest {
                stmt: stmt.clone(),
                label,
                iteration: 1,
            },
            target,
        ],
        StmtKind::DoWhile(w) => vec![
            QueueItem::Statement(w.body.clone()),
            QueueItem::ContinueTarget {
                label: label.clone(),
                depth,
            },
            QueueItem::Eval(w.test.clone()),
            QueueItem::LoopTest {
                stmt: stmt.clone(),
                label,
                iteration: 2,
            },
            target,
        ],
        StmtKind::For(f) => {
            let mut items = vec![QueueItem::EnterBlock(None)];
            match &f.init {
                Some(ForInit::Declaration(decl)) => items.extend(declaration_items(decl)),
                Some(ForInit::Expression(expr)) => {
                    items.push(QueueItem::Eval(expr.clone()));
                    items.push(QueueItem::Discard);
                }
                None => {}
            }
            items.push(for_test(&f.test));
            items.push(QueueItem::LoopTest {
                stmt: stmt.clone(),
                label,
                iteration: 1,
            });
            items.push(target);
            items.push(QueueItem::ExitBlock);
            items
        }
        StmtKind::ForIn(each) | StmtKind::ForOf(each) => vec![
            QueueItem::Eval(each.iterable.clone()),
            QueueItem::ForEachStart {
                stmt: stmt.clone(),
                label,
            },
            target,
        ],
        _ => Vec::new(),
    }
}

fn switch_of(stmt: &StmtRef) -> ScriptResult<&SwitchStmt> {
    match &stmt.kind {
        StmtKind::Switch(switch) => Ok(switch),
        _ => Err(mismatch("switch")),
    }
}

/// All case bodies share one block, entered before the first test.
fn switch_items(stmt: &StmtRef, label: Option<String>, depth: StackDepth) -> Vec<QueueItem> {
    let StmtKind::Switch(switch) = &stmt.kind else {
        return Vec::new();
    };
    let body: Vec<StmtRef> = switch.cases.iter().flat_map(|c| c.body.iter().cloned()).collect();
    vec![
        QueueItem::Eval(switch.discriminant.clone()),
        QueueItem::EnterBlock(Some(body.into())),
        QueueItem::SwitchDispatch {
            stmt: stmt.clone(),
            index: 0,
        },
        QueueItem::BreakTarget {
            label,
            breakable: true,
            depth,
        },
        QueueItem::ExitBlock,
    ]
}

/// Statements of case `from` and every case after it (fallthrough).
fn case_bodies(switch: &SwitchStmt, from: usize) -> Vec<QueueItem> {
    switch.cases[from..]
        .iter()
        .flat_map(|c| c.body.iter().cloned())
        .map(QueueItem::Statement)
        .collect()
}

fn spread_operand(expr: &ExprRef) -> ExprRef {
    match &expr.kind {
        ExprKind::Spread(inner) => inner.clone(),
        _ => expr.clone(),
    }
}

fn spread_flags(elements: &[ExprRef]) -> Vec<bool> {
    elements
        .iter()
        .map(|e| matches!(e.kind, ExprKind::Spread(_)))
        .collect()
}

/// Whether evaluating the expression may call a function.
fn contains_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Arrow(_) => false,
        ExprKind::Invocation(_) => true,
        ExprKind::Template(template) => template.expressions.iter().any(|e| contains_call(e)),
        ExprKind::Unary(unary) => contains_call(&unary.argument),
        ExprKind::Binary(binary) => contains_call(&binary.left) || contains_call(&binary.right),
        ExprKind::Assignment(assignment) => {
            contains_call(&assignment.target) || contains_call(&assignment.value)
        }
        ExprKind::Update(update) => contains_call(&update.argument),
        ExprKind::Sequence(list) | ExprKind::Array(list) => list.iter().any(|e| contains_call(e)),
        ExprKind::Conditional(conditional) => {
            contains_call(&conditional.test)
                || contains_call(&conditional.consequent)
                || contains_call(&conditional.alternate)
        }
        ExprKind::Member(member) => contains_call(&member.object),
        ExprKind::CalculatedMember(member) => {
            contains_call(&member.object) || contains_call(&member.property)
        }
        ExprKind::Object(properties) => properties.iter().any(|p| match p {
            ObjectProperty::Property { key, value } => {
                matches!(key, PropertyName::Computed(k) if contains_call(k)) || contains_call(value)
            }
            ObjectProperty::Spread(e) => contains_call(e),
        }),
        ExprKind::Spread(inner) => contains_call(inner),
        ExprKind::Destructure(destructure) => contains_call(&destructure.value),
    }
}

/// Steps that resolve an assignment target onto the place stack.
fn place_items(expr: &ExprRef, message: &str) -> ScriptResult<Vec<QueueItem>> {
    match &expr.kind {
        ExprKind::Identifier(_) => Ok(vec![QueueItem::Task(ExprTask::IdentifierPlace(expr.clone()))]),
        ExprKind::Member(member) => Ok(vec![
            QueueItem::Eval(member.object.clone()),
            QueueItem::Task(ExprTask::MemberPlace(expr.clone())),
        ]),
        ExprKind::CalculatedMember(member) => Ok(vec![
            QueueItem::Eval(member.object.clone()),
            QueueItem::Eval(member.property.clone()),
            QueueItem::Task(ExprTask::ComputedPlace),
        ]),
        _ => Err(ScriptError::syntax(message, expr.span)),
    }
}

/// Split an expression into evaluation steps.
fn expand_expression(expr: &ExprRef) -> ScriptResult<Vec<QueueItem>> {
    use QueueItem::{Eval, Task};

    let items = match &expr.kind {
        ExprKind::Template(template) => {
            let mut items: Vec<QueueItem> = template.expressions.iter().cloned().map(Eval).collect();
            items.push(Task(ExprTask::Template(expr.clone())));
            items
        }
        ExprKind::Unary(unary) => match unary.operator {
            crate::ast::UnaryOp::Delete => {
                let mut items = place_items(&unary.argument, "Invalid delete target")?;
                items.push(Task(ExprTask::Delete));
                items
            }
            op => vec![Eval(unary.argument.clone()), Task(ExprTask::Unary(op))],
        },
        ExprKind::Binary(binary) if binary.operator.is_logical() => {
            vec![Eval(binary.left.clone()), Task(ExprTask::Logical(expr.clone()))]
        }
        ExprKind::Binary(binary) => vec![
            Eval(binary.left.clone()),
            Eval(binary.right.clone()),
            Task(ExprTask::Binary(binary.operator)),
        ],
        ExprKind::Assignment(assignment) => {
            let mut items = place_items(&assignment.target, "Invalid left-hand side in assignment")?;
            if !assignment.operator.is_logical() {
                items.push(Task(ExprTask::EnsureWritable));
            }
            match assignment.operator {
                crate::ast::AssignmentOp::Assign => {
                    items.push(Eval(assignment.value.clone()));
                    items.push(Task(ExprTask::Assign));
                }
                op if op.is_logical() => items.push(Task(ExprTask::LogicalAssign(expr.clone()))),
                op => {
                    let binary = op.binary().ok_or_else(|| mismatch("compound assignment"))?;
                    items.push(Task(ExprTask::ReadPlace));
                    items.push(Eval(assignment.value.clone()));
                    items.push(Task(ExprTask::Compound(binary)));
                }
            }
            items
        }
        ExprKind::Update(update) => {
            let message = if update.prefix {
                "Invalid left-hand side expression in prefix operation"
            } else {
                "Invalid left-hand side expression in postfix operation"
            };
            let mut items = place_items(&update.argument, message)?;
            items.push(Task(ExprTask::Update {
                op: update.operator,
                prefix: update.prefix,
            }));
            items
        }
        ExprKind::Sequence(list) => {
            let mut items = Vec::with_capacity(list.len() * 2);
            for (i, e) in list.iter().enumerate() {
                items.push(Eval(e.clone()));
                if i + 1 < list.len() {
                    items.push(QueueItem::Discard);
                }
            }
            items
        }
        ExprKind::Conditional(conditional) => vec![
            Eval(conditional.test.clone()),
            Task(ExprTask::Conditional(expr.clone())),
        ],
        ExprKind::Invocation(call) => {
            let mut items = match &call.callee.kind {
                ExprKind::Member(member) => vec![
                    Eval(member.object.clone()),
                    Task(ExprTask::GetMember {
                        expr: call.callee.clone(),
                        method: true,
                    }),
                ],
                ExprKind::CalculatedMember(member) => vec![
                    Eval(member.object.clone()),
                    Task(ExprTask::ComputedKey {
                        expr: call.callee.clone(),
                        method: true,
                    }),
                ],
                _ => vec![Eval(call.callee.clone()), Task(ExprTask::PlainCallee)],
            };
            items.push(Task(ExprTask::PrepareCall(expr.clone())));
            items
        }
        ExprKind::Member(member) => vec![
            Eval(member.object.clone()),
            Task(ExprTask::GetMember {
                expr: expr.clone(),
                method: false,
            }),
        ],
        ExprKind::CalculatedMember(member) => vec![
            Eval(member.object.clone()),
            Task(ExprTask::ComputedKey {
                expr: expr.clone(),
                method: false,
            }),
        ],
        ExprKind::Array(elements) => {
            let mut items: Vec<QueueItem> = elements.iter().map(|e| Eval(spread_operand(e))).collect();
            items.push(Task(ExprTask::BuildArray(expr.clone())));
            items
        }
        ExprKind::Object(properties) => {
            let mut items = Vec::with_capacity(properties.len() + 1);
            for property in properties {
                match property {
                    ObjectProperty::Property { key, value } => {
                        if let PropertyName::Computed(key) = key {
                            items.push(Eval(key.clone()));
                        }
                        items.push(Eval(value.clone()));
                    }
                    ObjectProperty::Spread(e) => items.push(Eval(e.clone())),
                }
            }
            items.push(Task(ExprTask::BuildObject(expr.clone())));
            items
        }
        ExprKind::Destructure(destructure) => vec![
            Eval(destructure.value.clone()),
            Task(ExprTask::Destructure(expr.clone())),
        ],
        ExprKind::Spread(_) => return Err(ScriptError::syntax("Unexpected token '...'", expr.span)),
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Arrow(_) => {
            return Err(mismatch("call-free expression"))
        }
    };
    Ok(items)
}
