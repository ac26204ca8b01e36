//! Bindscript
//!
//! Embedded expression and statement language behind declarative UI data
//! bindings and event handlers.
//!
//! # Architecture
//!
//! - `lexer`, `parser`, `ast`: source text to an immutable, shared AST
//! - `resolver`: free identifiers and reactive dependency paths
//! - `simplify`: fixed-point constant folding
//! - `scope`, `gc`, `context`: block scopes, logical threads and session state
//! - `operators`, `eval`, `builtins`: evaluation primitives and the global library
//! - `interpreter`: immediate tree-walking evaluation
//! - `queue`, `processor`: resumable statement queue processors
//! - `module`: import/export graph resolution
//!
//! # Usage
//!
//! ```ignore
//! use bindscript::{EngineConfig, EvaluationContext};
//!
//! let mut ctx = EvaluationContext::with_builtins(EngineConfig::default());
//! let thread = ctx.create_thread();
//! let value = bindscript::evaluate_expression(&mut ctx, thread, "1 + 2 * 3")?;
//! assert_eq!(value.to_number(), 7.0);
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod gc;
pub mod interpreter;
pub mod lexer;
pub mod module;
pub mod object;
pub mod operators;
pub mod parser;
pub mod processor;
pub mod queue;
pub mod resolver;
pub mod scope;
pub mod simplify;
pub mod token;
pub mod value;

pub use config::{ConfigError, EngineConfig};
pub use context::EvaluationContext;
pub use error::{ScriptError, ScriptResult};
pub use module::{resolve_modules, DiagnosticCode, ModuleDiagnostic, ModuleGraph};
pub use operators::OperatorCalculator;
pub use parser::{parse_expression, parse_module, parse_statements};
pub use processor::{ProcessorMode, ProcessorState, StatementProcessor};
pub use resolver::{resolve_expression, resolve_statements, ResolutionScope, TrackedApis};
pub use scope::ThreadId;
pub use simplify::simplify;
pub use value::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse and evaluate a binding expression on `thread`.
pub fn evaluate_expression(ctx: &mut EvaluationContext, thread: ThreadId, source: &str) -> ScriptResult<Value> {
    let expr = parse_expression(source)?;
    interpreter::evaluate(ctx, thread, &expr)
}

/// Run a statement sequence synchronously and return its completion value.
pub fn run_statements(ctx: &mut EvaluationContext, thread: ThreadId, source: &str) -> ScriptResult<Value> {
    let statements = parse_statements(source)?;
    let mut processor = StatementProcessor::new(ProcessorMode::Sync, thread, statements);
    processor.run(ctx)?;
    Ok(processor.completion_value().clone())
}
