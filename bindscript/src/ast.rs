//! Abstract syntax tree for binding expressions, event handlers and modules.
//!
//! Nodes are immutable and reference counted. Rewrites (see `simplify`)
//! build new nodes and share unchanged children, so identity comparison
//! with `Rc::ptr_eq` tells whether a pass changed anything.

use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::token::Span;

/// Shared expression node.
pub type ExprRef = Rc<Expr>;

/// Shared statement node.
pub type StmtRef = Rc<Stmt>;

/// Shared statement list (block bodies, case bodies).
pub type StmtList = Rc<[StmtRef]>;

/// The exact slice of source text a node was parsed from.
#[derive(Clone)]
pub struct SourceRef {
    text: Rc<str>,
    start: usize,
    end: usize,
}

impl SourceRef {
    /// Reference `text[start..end]`.
    pub fn new(text: Rc<str>, start: usize, end: usize) -> Self {
        let end = end.min(text.len());
        let start = start.min(end);
        SourceRef { text, start, end }
    }

    /// Source for nodes synthesized outside the parser.
    pub fn synthetic() -> Self {
        SourceRef {
            text: Rc::from(""),
            start: 0,
            end: 0,
        }
    }

    /// The referenced text.
    pub fn as_str(&self) -> &str {
        self.text.get(self.start..self.end).unwrap_or("")
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub source: SourceRef,
}

impl Expr {
    /// Create a shared expression node.
    pub fn new(kind: ExprKind, span: Span, source: SourceRef) -> ExprRef {
        Rc::new(Expr { kind, span, source })
    }

    /// Build a node of a new kind carrying this node's position.
    pub fn with_kind(&self, kind: ExprKind) -> ExprRef {
        Expr::new(kind, self.span, self.source.clone())
    }

    /// Source text of the node.
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// The literal, if this node is one.
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// The identifier, if this node is one.
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match &self.kind {
            ExprKind::Identifier(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// Whether the node can be assigned to, deleted or incremented.
    pub fn is_place(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::Member(_) | ExprKind::CalculatedMember(_)
        )
    }
}

/// Expression variants.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Identifier),
    Template(TemplateExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Assignment(AssignmentExpr),
    /// Prefix or postfix `++` / `--`.
    Update(UpdateExpr),
    Sequence(Vec<ExprRef>),
    Conditional(ConditionalExpr),
    Invocation(InvocationExpr),
    Member(MemberExpr),
    CalculatedMember(CalculatedMemberExpr),
    Array(Vec<ExprRef>),
    Object(Vec<ObjectProperty>),
    /// `...expr`, only meaningful inside array/object literals and arguments.
    Spread(ExprRef),
    Arrow(Rc<ArrowFunction>),
    /// Destructuring assignment (`[a, b] = value`).
    Destructure(DestructureExpr),
}

/// Literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(BigInt),
    String(String),
}

/// Identifier reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    /// Resolve straight against the global container.
    pub global: bool,
}

/// Template literal. `quasis` has one more entry than `expressions`.
#[derive(Debug, Clone)]
pub struct TemplateExpr {
    pub quasis: Vec<String>,
    pub expressions: Vec<ExprRef>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// -
    Minus,
    /// +
    Plus,
    /// !
    Not,
    /// ~
    BitNot,
    /// typeof
    Typeof,
    /// delete
    Delete,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Delete => "delete",
        }
    }
}

/// Unary expression.
#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub operator: UnaryOp,
    pub argument: ExprRef,
}

/// Binary operators, including the short-circuit logical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitAnd,
    BitOr,
    BitXor,
    In,
    /// &&
    And,
    /// ||
    Or,
    /// ??
    Nullish,
}

impl BinaryOp {
    /// Operators that may skip evaluating their right operand.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::StrictEqual => "===",
            BinaryOp::StrictNotEqual => "!==",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::UnsignedRightShift => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Nullish => "??",
        }
    }
}

/// Binary expression.
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub operator: BinaryOp,
    pub left: ExprRef,
    pub right: ExprRef,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Nullish,
}

impl AssignmentOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        Some(match self {
            AssignmentOp::Assign => return None,
            AssignmentOp::Add => BinaryOp::Add,
            AssignmentOp::Sub => BinaryOp::Sub,
            AssignmentOp::Mul => BinaryOp::Mul,
            AssignmentOp::Div => BinaryOp::Div,
            AssignmentOp::Mod => BinaryOp::Mod,
            AssignmentOp::Exp => BinaryOp::Exp,
            AssignmentOp::LeftShift => BinaryOp::LeftShift,
            AssignmentOp::RightShift => BinaryOp::RightShift,
            AssignmentOp::UnsignedRightShift => BinaryOp::UnsignedRightShift,
            AssignmentOp::BitAnd => BinaryOp::BitAnd,
            AssignmentOp::BitOr => BinaryOp::BitOr,
            AssignmentOp::BitXor => BinaryOp::BitXor,
            AssignmentOp::And => BinaryOp::And,
            AssignmentOp::Or => BinaryOp::Or,
            AssignmentOp::Nullish => BinaryOp::Nullish,
        })
    }

    /// `&&=`, `||=` and `??=` only assign when the current value demands it.
    pub fn is_logical(self) -> bool {
        matches!(self, AssignmentOp::And | AssignmentOp::Or | AssignmentOp::Nullish)
    }
}

/// Assignment expression.
#[derive(Debug, Clone)]
pub struct AssignmentExpr {
    pub operator: AssignmentOp,
    pub target: ExprRef,
    pub value: ExprRef,
}

/// `++` or `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Update expression.
#[derive(Debug, Clone)]
pub struct UpdateExpr {
    pub operator: UpdateOp,
    pub prefix: bool,
    pub argument: ExprRef,
}

/// Conditional (ternary) expression.
#[derive(Debug, Clone)]
pub struct ConditionalExpr {
    pub test: ExprRef,
    pub consequent: ExprRef,
    pub alternate: ExprRef,
}

/// Function call.
#[derive(Debug, Clone)]
pub struct InvocationExpr {
    pub callee: ExprRef,
    pub arguments: Vec<ExprRef>,
    /// `f?.()` or part of an optional chain.
    pub optional: bool,
}

/// `object.property`.
#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub object: ExprRef,
    pub property: String,
    pub optional: bool,
}

/// `object[property]`.
#[derive(Debug, Clone)]
pub struct CalculatedMemberExpr {
    pub object: ExprRef,
    pub property: ExprRef,
    pub optional: bool,
}

/// Object literal entry.
#[derive(Debug, Clone)]
pub enum ObjectProperty {
    Property { key: PropertyName, value: ExprRef },
    Spread(ExprRef),
}

/// Object literal key.
#[derive(Debug, Clone)]
pub enum PropertyName {
    Static(String),
    Computed(ExprRef),
}

/// Arrow function, function declaration or function expression.
#[derive(Debug, Clone)]
pub struct ArrowFunction {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: ArrowBody,
}

/// Function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub pattern: Pattern,
    /// `...name`; always the last parameter and a plain identifier.
    pub rest: bool,
}

/// Function body.
#[derive(Debug, Clone)]
pub enum ArrowBody {
    Expression(ExprRef),
    Block(StmtList),
}

/// Destructuring assignment.
#[derive(Debug, Clone)]
pub struct DestructureExpr {
    pub pattern: Rc<Pattern>,
    pub value: ExprRef,
}

// ============================================================================
// Patterns
// ============================================================================

/// Binding pattern used by declarations, parameters and destructuring.
#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier(BindingName),
    Array(ArrayPattern),
    Object(ObjectPattern),
}

/// A name introduced by a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingName {
    pub name: String,
    pub span: Span,
}

/// `[a, , b, ...rest]`
#[derive(Debug, Clone)]
pub struct ArrayPattern {
    /// `None` marks a hole.
    pub elements: Vec<Option<Pattern>>,
    pub rest: Option<BindingName>,
}

/// `{ a, b: alias, c: { d }, ...rest }`
#[derive(Debug, Clone)]
pub struct ObjectPattern {
    pub properties: Vec<PatternProperty>,
    pub rest: Option<BindingName>,
}

/// One `key: pattern` entry of an object pattern.
#[derive(Debug, Clone)]
pub struct PatternProperty {
    pub key: String,
    pub value: Pattern,
}

impl Pattern {
    /// Every name the pattern binds, left to right.
    pub fn bound_names(&self) -> Vec<&BindingName> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a BindingName>) {
        match self {
            Pattern::Identifier(name) => names.push(name),
            Pattern::Array(array) => {
                for element in array.elements.iter().flatten() {
                    element.collect_names(names);
                }
                names.extend(array.rest.iter());
            }
            Pattern::Object(object) => {
                for property in &object.properties {
                    property.value.collect_names(names);
                }
                names.extend(object.rest.iter());
            }
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Statement node.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub source: SourceRef,
}

impl Stmt {
    /// Create a shared statement node.
    pub fn new(kind: StmtKind, span: Span, source: SourceRef) -> StmtRef {
        Rc::new(Stmt { kind, span, source })
    }

    /// Source text of the node.
    pub fn source(&self) -> &str {
        self.source.as_str()
    }
}

/// Statement variants.
#[derive(Debug, Clone)]
pub enum StmtKind {
    Empty,
    Block(StmtList),
    Expression(ExprRef),
    Declaration(VarDecl),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(WhileStmt),
    For(ForStmt),
    ForIn(ForEachStmt),
    ForOf(ForEachStmt),
    Switch(SwitchStmt),
    Break(Option<String>),
    Continue(Option<String>),
    Throw(ExprRef),
    Try(TryStmt),
    Return(Option<ExprRef>),
    Function(FunctionDecl),
    Import(ImportDecl),
    Labeled(LabeledStmt),
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

/// `let`/`const`/`var` declaration.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarators: Vec<Declarator>,
    /// Prefixed with `export` (module sources only).
    pub exported: bool,
}

/// One `pattern = init` entry of a declaration.
#[derive(Debug, Clone)]
pub struct Declarator {
    pub pattern: Rc<Pattern>,
    pub init: Option<ExprRef>,
}

/// If statement.
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub test: ExprRef,
    pub consequent: StmtRef,
    pub alternate: Option<StmtRef>,
}

/// While and do-while loops.
#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub test: ExprRef,
    pub body: StmtRef,
}

/// C-style for loop.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub test: Option<ExprRef>,
    pub update: Option<ExprRef>,
    pub body: StmtRef,
}

/// For loop initializer.
#[derive(Debug, Clone)]
pub enum ForInit {
    Declaration(VarDecl),
    Expression(ExprRef),
}

/// `for (binding in/of iterable) body`
#[derive(Debug, Clone)]
pub struct ForEachStmt {
    pub binding: ForBinding,
    pub iterable: ExprRef,
    pub body: StmtRef,
}

/// Loop variable of a for-in/for-of loop.
#[derive(Debug, Clone)]
pub enum ForBinding {
    Declared { kind: VarKind, pattern: Rc<Pattern> },
    /// Bare loop variable, assigned each iteration.
    Target(ExprRef),
}

/// Switch statement.
#[derive(Debug, Clone)]
pub struct SwitchStmt {
    pub discriminant: ExprRef,
    pub cases: Rc<[SwitchCase]>,
}

/// Switch case; `test` is `None` for `default`.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test: Option<ExprRef>,
    pub body: StmtList,
}

/// Try statement.
#[derive(Debug, Clone)]
pub struct TryStmt {
    pub block: StmtList,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<StmtList>,
}

/// Catch clause with optional binding.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Rc<Pattern>>,
    pub body: StmtList,
}

/// Function declaration.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: BindingName,
    pub function: Rc<ArrowFunction>,
    pub exported: bool,
}

/// `import { a, b as c } from "module"`
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub specifiers: Vec<ImportSpecifier>,
    pub module: String,
}

/// One imported name.
#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub imported: String,
    pub local: BindingName,
}

/// `label: statement`
#[derive(Debug, Clone)]
pub struct LabeledStmt {
    pub label: String,
    pub body: StmtRef,
}
