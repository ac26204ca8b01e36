//! Work items of the statement queue.
//!
//! Statements are unrolled into these steps instead of being executed on
//! the host stack. Every item is plain data referencing shared AST nodes,
//! so a suspended queue can be inspected and resumed later.

use std::rc::Rc;

use crate::ast::{BinaryOp, CatchClause, ExprRef, Pattern, StmtList, StmtRef, UnaryOp, UpdateOp, VarKind};
use crate::error::ScriptError;
use crate::value::Value;

/// Abrupt completion travelling through the queue.
#[derive(Debug, Clone)]
pub enum Completion {
    Break(Option<String>),
    Continue(Option<String>),
    Return(Value),
    Throw(ScriptError),
}

impl Completion {
    /// Whether a break target with this label stops the completion.
    pub fn breaks_at(&self, label: Option<&str>, breakable: bool) -> bool {
        match self {
            Completion::Break(None) => breakable,
            Completion::Break(Some(wanted)) => label == Some(wanted.as_str()),
            _ => false,
        }
    }

    /// Whether a continue target with this label stops the completion.
    pub fn continues_at(&self, label: Option<&str>) -> bool {
        match self {
            Completion::Continue(None) => true,
            Completion::Continue(Some(wanted)) => label == Some(wanted.as_str()),
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Completion::Break(label) => format!("break{}", label_suffix(label.as_deref())),
            Completion::Continue(label) => format!("continue{}", label_suffix(label.as_deref())),
            Completion::Return(value) => format!("return {:?}", value),
            Completion::Throw(error) => format!("throw {}", error),
        }
    }
}

fn label_suffix(label: Option<&str>) -> String {
    label.map(|l| format!(" {}", l)).unwrap_or_default()
}

/// Heights of the processor stacks at a control-flow boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackDepth {
    pub values: usize,
    pub receivers: usize,
    pub places: usize,
}

/// One step of the statement queue.
#[derive(Debug, Clone)]
pub enum QueueItem {
    /// Expand and run a statement.
    Statement(StmtRef),
    /// Open a block scope, hoisting the function declarations of `body`.
    EnterBlock(Option<StmtList>),
    ExitBlock,
    /// Hoist function declarations into the current block.
    Hoist(StmtList),
    /// Evaluate an expression onto the value stack.
    Eval(ExprRef),
    /// Continue a partially evaluated expression.
    Task(ExprTask),
    Push(Value),
    Discard,
    /// Pop the value of an expression statement.
    Complete,
    /// Pop a value and bind it to a declaration pattern.
    Declare { kind: VarKind, pattern: Rc<Pattern> },
    /// Pop the test value and queue one branch.
    Branch {
        consequent: StmtRef,
        alternate: Option<StmtRef>,
    },
    /// Pop a loop test value; run another iteration when truthy.
    LoopTest {
        stmt: StmtRef,
        label: Option<String>,
        iteration: usize,
    },
    /// Give a `for` loop's `let` bindings a fresh scope.
    RenewScope,
    /// Pop the iterable of a for-in/for-of loop.
    ForEachStart { stmt: StmtRef, label: Option<String> },
    ForEachNext {
        stmt: StmtRef,
        label: Option<String>,
        items: Rc<[Value]>,
        index: usize,
    },
    /// Evaluate the test of case `index`.
    SwitchDispatch { stmt: StmtRef, index: usize },
    /// Compare the discriminant with the test of case `index`.
    SwitchCompare { stmt: StmtRef, index: usize },
    BreakTarget {
        label: Option<String>,
        breakable: bool,
        depth: StackDepth,
    },
    ContinueTarget { label: Option<String>, depth: StackDepth },
    /// End of a protected region.
    TryEnd {
        handler: Option<CatchClause>,
        finalizer: Option<StmtList>,
        depth: StackDepth,
    },
    /// Pop the caught value and bind it to the catch parameter.
    BindCatch(Option<Rc<Pattern>>),
    /// Continue an abrupt completion interrupted by a `finally` block.
    Resume(Completion),
    Throw,
    Return,
    /// Boundary of a script function call running on the queue.
    FunctionExit { depth: StackDepth },
}

/// Continuation of an expression split across queue steps.
#[derive(Debug, Clone)]
pub enum ExprTask {
    /// Join the substitutions of a template node.
    Template(ExprRef),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Decide whether to evaluate the right side of `&&`, `||` or `??`.
    Logical(ExprRef),
    Conditional(ExprRef),
    IdentifierPlace(ExprRef),
    MemberPlace(ExprRef),
    ComputedPlace,
    Assign,
    /// Fail early when the top place is a `const` binding.
    EnsureWritable,
    /// Push the current value of the top place.
    ReadPlace,
    Compound(BinaryOp),
    LogicalAssign(ExprRef),
    Update { op: UpdateOp, prefix: bool },
    Delete,
    Destructure(ExprRef),
    /// Read `object.name`; for calls, also keep the object as receiver.
    GetMember { expr: ExprRef, method: bool },
    /// Short-circuit an optional computed access or evaluate its key.
    ComputedKey { expr: ExprRef, method: bool },
    GetComputed { expr: ExprRef, method: bool },
    PlainCallee,
    /// Check the callee and queue the arguments.
    PrepareCall(ExprRef),
    Call(ExprRef),
    BuildArray(ExprRef),
    BuildObject(ExprRef),
}

impl QueueItem {
    /// Short human-readable form used by queue snapshots.
    pub fn describe(&self) -> String {
        match self {
            QueueItem::Statement(stmt) => format!("statement `{}`", stmt.source()),
            QueueItem::EnterBlock(_) => "enter block".into(),
            QueueItem::ExitBlock => "exit block".into(),
            QueueItem::Hoist(body) => format!("hoist {} statements", body.len()),
            QueueItem::Eval(expr) => format!("eval `{}`", expr.source()),
            QueueItem::Task(task) => task.describe(),
            QueueItem::Push(value) => format!("push {:?}", value),
            QueueItem::Discard => "discard".into(),
            QueueItem::Complete => "complete".into(),
            QueueItem::Declare { kind, pattern } => {
                let names: Vec<&str> = pattern.bound_names().iter().map(|n| n.name.as_str()).collect();
                format!("declare {} {}", kind.as_str(), names.join(", "))
            }
            QueueItem::Branch { .. } => "branch".into(),
            QueueItem::LoopTest { iteration, label, .. } => {
                format!("loop test{} #{}", label_suffix(label.as_deref()), iteration)
            }
            QueueItem::RenewScope => "renew scope".into(),
            QueueItem::ForEachStart { .. } => "for-each start".into(),
            QueueItem::ForEachNext { items, index, .. } => {
                format!("for-each next {}/{}", index, items.len())
            }
            QueueItem::SwitchDispatch { index, .. } => format!("switch case {}", index),
            QueueItem::SwitchCompare { index, .. } => format!("switch compare {}", index),
            QueueItem::BreakTarget { label, .. } => format!("break target{}", label_suffix(label.as_deref())),
            QueueItem::ContinueTarget { label, .. } => {
                format!("continue target{}", label_suffix(label.as_deref()))
            }
            QueueItem::TryEnd { handler, finalizer, .. } => format!(
                "try end (catch: {}, finally: {})",
                handler.is_some(),
                finalizer.is_some()
            ),
            QueueItem::BindCatch(_) => "bind catch".into(),
            QueueItem::Resume(completion) => format!("resume {}", completion.describe()),
            QueueItem::Throw => "throw".into(),
            QueueItem::Return => "return".into(),
            QueueItem::FunctionExit { .. } => "function exit".into(),
        }
    }
}

impl ExprTask {
    pub fn describe(&self) -> String {
        match self {
            ExprTask::Template(_) => "template".into(),
            ExprTask::Unary(op) => format!("unary {}", op.as_str()),
            ExprTask::Binary(op) => format!("binary {}", op.as_str()),
            ExprTask::Logical(expr) => format!("logical `{}`", expr.source()),
            ExprTask::Conditional(_) => "conditional".into(),
            ExprTask::IdentifierPlace(expr) => format!("place `{}`", expr.source()),
            ExprTask::MemberPlace(expr) => format!("place `{}`", expr.source()),
            ExprTask::ComputedPlace => "computed place".into(),
            ExprTask::Assign => "assign".into(),
            ExprTask::EnsureWritable => "check writable".into(),
            ExprTask::ReadPlace => "read place".into(),
            ExprTask::Compound(op) => format!("compound {}=", op.as_str()),
            ExprTask::LogicalAssign(expr) => format!("logical assign `{}`", expr.source()),
            ExprTask::Update { op, prefix } => format!(
                "{} {}",
                if *prefix { "prefix" } else { "postfix" },
                match op {
                    UpdateOp::Increment => "++",
                    UpdateOp::Decrement => "--",
                }
            ),
            ExprTask::Delete => "delete".into(),
            ExprTask::Destructure(_) => "destructure".into(),
            ExprTask::GetMember { expr, .. } => format!("member `{}`", expr.source()),
            ExprTask::ComputedKey { expr, .. } => format!("computed key `{}`", expr.source()),
            ExprTask::GetComputed { expr, .. } => format!("computed member `{}`", expr.source()),
            ExprTask::PlainCallee => "callee".into(),
            ExprTask::PrepareCall(expr) => format!("prepare call `{}`", expr.source()),
            ExprTask::Call(expr) => format!("call `{}`", expr.source()),
            ExprTask::BuildArray(_) => "build array".into(),
            ExprTask::BuildObject(_) => "build object".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_matching() {
        let unlabeled = Completion::Break(None);
        assert!(unlabeled.breaks_at(None, true));
        assert!(unlabeled.breaks_at(Some("outer"), true));
        assert!(!unlabeled.breaks_at(Some("block"), false));

        let labeled = Completion::Break(Some("outer".into()));
        assert!(!labeled.breaks_at(None, true));
        assert!(labeled.breaks_at(Some("outer"), false));
    }

    #[test]
    fn test_continue_matching() {
        assert!(Completion::Continue(None).continues_at(Some("outer")));
        assert!(!Completion::Continue(Some("outer".into())).continues_at(None));
        assert!(!Completion::Return(Value::Undefined).continues_at(None));
    }

    #[test]
    fn test_describe() {
        let item = QueueItem::BreakTarget {
            label: Some("outer".into()),
            breakable: true,
            depth: StackDepth::default(),
        };
        assert_eq!(item.describe(), "break target outer");
        assert_eq!(QueueItem::Resume(Completion::Break(None)).describe(), "resume break");
    }
}
