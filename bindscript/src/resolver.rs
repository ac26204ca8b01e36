//! Identifier classification and reactive dependency extraction.
//!
//! The resolver walks an expression or statement list with a stack of
//! lexical name sets. Every identifier is either bound by an enclosing
//! scope or free; free reads, flattened with their member chains into
//! paths such as `a.b['0'].c`, are the dependencies a binding must be
//! re-evaluated on.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use serde::{Serialize, Serializer};

use crate::ast::{
    ArrowBody, ArrowFunction, Expr, ExprKind, ForBinding, ForInit, Literal, ObjectProperty,
    Pattern, PropertyName, Stmt, StmtKind, StmtRef, VarDecl, VarKind,
};
use crate::token::Span;
use crate::value::{number_to_string, Value};

/// Where a top-level name comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum NameSite {
    /// Declared by a top-level statement of the analyzed fragment.
    Declared { kind: &'static str, span: Span },
    /// Referenced but bound nowhere inside the fragment.
    Free,
}

impl Serialize for NameSite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        match self {
            NameSite::Free => serializer.serialize_bool(true),
            NameSite::Declared { kind, span } => {
                let mut site = serializer.serialize_struct("NameSite", 2)?;
                site.serialize_field("kind", kind)?;
                site.serialize_field("span", span)?;
                site.end()
            }
        }
    }
}

/// Result of resolving a fragment.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionScope {
    /// Top-level declarations and free identifiers.
    pub top_level_names: BTreeMap<String, NameSite>,
    /// Per top-level declared name, the outer names and paths it reads.
    pub top_level_deps: BTreeMap<String, Vec<String>>,
    /// Every free dependency path, deduplicated, in first-seen order.
    pub all_deps: Vec<String>,
}

impl ResolutionScope {
    /// Whether `path` is among the free dependencies.
    pub fn depends_on(&self, path: &str) -> bool {
        self.all_deps.iter().any(|dep| dep == path)
    }
}

/// Host methods whose calls are recorded as `object.method` dependencies.
#[derive(Debug, Clone, Default)]
pub struct TrackedApis {
    methods: HashMap<String, HashSet<String>>,
}

impl TrackedApis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a single method of the object reachable at `object`.
    pub fn track(&mut self, object: &str, method: &str) {
        self.methods
            .entry(object.to_string())
            .or_default()
            .insert(method.to_string());
    }

    /// Track every function-valued member of `value` under `object`.
    pub fn track_object(&mut self, object: &str, value: &Value) {
        if let Value::Object(members) = value {
            for (name, member) in members.borrow().iter() {
                if member.is_function() {
                    self.track(object, name);
                }
            }
        }
    }

    pub fn is_tracked(&self, object: &str, method: &str) -> bool {
        self.methods
            .get(object)
            .is_some_and(|methods| methods.contains(method))
    }
}

/// Resolve the free dependencies of a single expression.
pub fn resolve_expression(expr: &Expr, tracked: &TrackedApis) -> ResolutionScope {
    let mut resolver = DependencyResolver::new(tracked);
    resolver.expression(expr);
    resolver.finish()
}

/// Resolve a statement list, tracking dependencies per top-level declaration.
pub fn resolve_statements(statements: &[StmtRef], tracked: &TrackedApis) -> ResolutionScope {
    let mut resolver = DependencyResolver::new(tracked);
    resolver.top_level(statements);
    resolver.finish()
}

/// Scope facts the module resolver turns into diagnostics.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModuleFacts {
    /// Reads or writes of root-scope names from inside a function body.
    pub top_level_uses: Vec<(String, Span)>,
    /// `var` declarations inside a function body.
    pub function_vars: Vec<Span>,
    /// Exported declarations below the top level.
    pub nested_exports: Vec<(String, Span)>,
}

/// Resolve a module body and collect its [`ModuleFacts`].
pub(crate) fn analyze_module(statements: &[StmtRef], tracked: &TrackedApis) -> (ResolutionScope, ModuleFacts) {
    let mut resolver = DependencyResolver::new(tracked);
    resolver.top_level(statements);
    let facts = std::mem::take(&mut resolver.facts);
    (resolver.finish(), facts)
}

#[derive(Default)]
struct LexicalScope {
    names: HashSet<String>,
    /// Function bodies and the root receive hoisted `var` names.
    function: bool,
}

/// How an identifier resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Free,
    /// Bound in the root scope of a statement fragment.
    TopLevel,
    Local,
}

/// Stateful walker behind [`resolve_expression`] and [`resolve_statements`].
pub struct DependencyResolver<'a> {
    tracked: &'a TrackedApis,
    scopes: Vec<LexicalScope>,
    /// Whether scope 0 holds top-level declarations.
    statement_root: bool,
    /// Names declared by the top-level statement being walked.
    current: Vec<String>,
    result: ResolutionScope,
    seen: HashSet<String>,
    function_depth: usize,
    statement_depth: usize,
    facts: ModuleFacts,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(tracked: &'a TrackedApis) -> Self {
        DependencyResolver {
            tracked,
            scopes: vec![LexicalScope {
                names: HashSet::new(),
                function: true,
            }],
            statement_root: false,
            current: Vec::new(),
            result: ResolutionScope::default(),
            seen: HashSet::new(),
            function_depth: 0,
            statement_depth: 0,
            facts: ModuleFacts::default(),
        }
    }

    pub fn finish(self) -> ResolutionScope {
        log::trace!(
            "[Resolver] {} names, {} dependencies",
            self.result.top_level_names.len(),
            self.result.all_deps.len()
        );
        self.result
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn push_scope(&mut self, function: bool) {
        self.scopes.push(LexicalScope {
            names: HashSet::new(),
            function,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string());
        }
    }

    fn bind_var(&mut self, name: &str) {
        if let Some(scope) = self.scopes.iter_mut().rev().find(|scope| scope.function) {
            scope.names.insert(name.to_string());
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern, kind: VarKind) {
        for name in pattern.bound_names() {
            match kind {
                VarKind::Var => self.bind_var(&name.name),
                _ => self.bind(&name.name),
            }
        }
    }

    fn classify(&self, name: &str) -> Binding {
        match self.scopes.iter().rposition(|scope| scope.names.contains(name)) {
            None => Binding::Free,
            Some(0) if self.statement_root => Binding::TopLevel,
            Some(_) => Binding::Local,
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    fn note_free(&mut self, name: &str) {
        self.result
            .top_level_names
            .entry(name.to_string())
            .or_insert(NameSite::Free);
    }

    /// Record a read of `path`, whose root identifier is `root`.
    fn record(&mut self, root: &str, path: String) {
        let binding = self.classify(root);
        if binding == Binding::Local || self.current.iter().any(|name| name == root) {
            return;
        }
        for name in &self.current {
            let deps = self.result.top_level_deps.entry(name.clone()).or_default();
            if !deps.contains(&path) {
                deps.push(path.clone());
            }
        }
        if binding == Binding::Free {
            self.note_free(root);
            if self.seen.insert(path.clone()) {
                self.result.all_deps.push(path);
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn top_level(&mut self, statements: &[StmtRef]) {
        self.statement_root = true;
        self.hoist(statements);
        for statement in statements {
            let names = declared_names(statement);
            for (name, kind, span) in &names {
                self.result
                    .top_level_names
                    .insert(name.clone(), NameSite::Declared { kind, span: *span });
                self.result.top_level_deps.entry(name.clone()).or_default();
            }
            self.current = names.into_iter().map(|(name, _, _)| name).collect();
            self.statement(statement);
            self.current.clear();
        }
    }

    /// Bind every name a statement list declares before walking it.
    fn hoist(&mut self, statements: &[StmtRef]) {
        for statement in statements {
            match &statement.kind {
                StmtKind::Declaration(decl) => {
                    for declarator in &decl.declarators {
                        self.bind_pattern(&declarator.pattern, decl.kind);
                    }
                }
                StmtKind::Function(function) => self.bind(&function.name.name),
                StmtKind::Import(import) => {
                    for specifier in &import.specifiers {
                        self.bind(&specifier.local.name);
                    }
                }
                _ => {}
            }
        }
    }

    fn block(&mut self, statements: &[StmtRef]) {
        self.push_scope(false);
        self.hoist(statements);
        self.statements(statements);
        self.pop_scope();
    }

    fn statements(&mut self, statements: &[StmtRef]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Stmt) {
        self.note_declaration(statement);
        self.statement_depth += 1;
        self.statement_kind(statement);
        self.statement_depth -= 1;
    }

    fn note_declaration(&mut self, statement: &Stmt) {
        let nested = self.statement_depth > 0;
        match &statement.kind {
            StmtKind::Declaration(decl) => {
                if decl.exported && nested {
                    for declarator in &decl.declarators {
                        for name in declarator.pattern.bound_names() {
                            self.facts.nested_exports.push((name.name.clone(), name.span));
                        }
                    }
                }
                self.note_var(decl.kind, statement.span);
            }
            StmtKind::Function(function) if function.exported && nested => {
                self.facts
                    .nested_exports
                    .push((function.name.name.clone(), function.name.span));
            }
            StmtKind::For(stmt) => {
                if let Some(ForInit::Declaration(decl)) = &stmt.init {
                    self.note_var(decl.kind, statement.span);
                }
            }
            StmtKind::ForIn(stmt) | StmtKind::ForOf(stmt) => {
                if let ForBinding::Declared { kind, .. } = &stmt.binding {
                    self.note_var(*kind, statement.span);
                }
            }
            _ => {}
        }
    }

    fn note_var(&mut self, kind: VarKind, span: Span) {
        if kind == VarKind::Var && self.function_depth > 0 {
            self.facts.function_vars.push(span);
        }
    }

    fn note_use(&mut self, name: &str, span: Span) {
        if self.function_depth > 0 && self.classify(name) == Binding::TopLevel {
            self.facts.top_level_uses.push((name.to_string(), span));
        }
    }

    fn statement_kind(&mut self, statement: &Stmt) {
        match &statement.kind {
            StmtKind::Empty | StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Import(_) => {}
            StmtKind::Block(body) => self.block(body),
            StmtKind::Expression(expr) | StmtKind::Throw(expr) => self.expression(expr),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expression(value);
                }
            }
            StmtKind::Declaration(decl) => self.declaration(decl),
            StmtKind::Function(function) => self.function(&function.function),
            StmtKind::If(stmt) => {
                self.expression(&stmt.test);
                self.nested(&stmt.consequent);
                if let Some(alternate) = &stmt.alternate {
                    self.nested(alternate);
                }
            }
            StmtKind::While(stmt) | StmtKind::DoWhile(stmt) => {
                self.expression(&stmt.test);
                self.nested(&stmt.body);
            }
            StmtKind::For(stmt) => {
                self.push_scope(false);
                match &stmt.init {
                    Some(ForInit::Declaration(decl)) => self.declaration(decl),
                    Some(ForInit::Expression(expr)) => self.expression(expr),
                    None => {}
                }
                if let Some(test) = &stmt.test {
                    self.expression(test);
                }
                if let Some(update) = &stmt.update {
                    self.expression(update);
                }
                self.nested(&stmt.body);
                self.pop_scope();
            }
            StmtKind::ForIn(stmt) | StmtKind::ForOf(stmt) => {
                self.push_scope(false);
                match &stmt.binding {
                    ForBinding::Declared { kind, pattern } => self.bind_pattern(pattern, *kind),
                    ForBinding::Target(target) => self.assignment_target(target),
                }
                self.expression(&stmt.iterable);
                self.nested(&stmt.body);
                self.pop_scope();
            }
            StmtKind::Switch(stmt) => {
                self.expression(&stmt.discriminant);
                self.push_scope(false);
                for case in stmt.cases.iter() {
                    self.hoist(&case.body);
                }
                for case in stmt.cases.iter() {
                    if let Some(test) = &case.test {
                        self.expression(test);
                    }
                    self.statements(&case.body);
                }
                self.pop_scope();
            }
            StmtKind::Try(stmt) => {
                self.block(&stmt.block);
                if let Some(handler) = &stmt.handler {
                    self.push_scope(false);
                    if let Some(param) = &handler.param {
                        self.bind_pattern(param, VarKind::Let);
                    }
                    self.block(&handler.body);
                    self.pop_scope();
                }
                if let Some(finalizer) = &stmt.finalizer {
                    self.block(finalizer);
                }
            }
            StmtKind::Labeled(stmt) => self.nested(&stmt.body),
        }
    }

    /// A statement in a position that opens its own scope when it declares.
    fn nested(&mut self, statement: &StmtRef) {
        match &statement.kind {
            StmtKind::Block(body) => self.block(body),
            _ => self.block(std::slice::from_ref(statement)),
        }
    }

    fn declaration(&mut self, decl: &VarDecl) {
        for declarator in &decl.declarators {
            self.bind_pattern(&declarator.pattern, decl.kind);
            if let Some(init) = &declarator.init {
                self.expression(init);
            }
        }
    }

    fn function(&mut self, function: &ArrowFunction) {
        self.function_depth += 1;
        self.push_scope(true);
        if let Some(name) = &function.name {
            self.bind(name);
        }
        for param in &function.params {
            self.bind_pattern(&param.pattern, VarKind::Let);
        }
        match &function.body {
            ArrowBody::Expression(body) => self.expression(body),
            ArrowBody::Block(body) => {
                self.hoist(body);
                self.statements(body);
            }
        }
        self.pop_scope();
        self.function_depth -= 1;
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Identifier(identifier) => {
                if identifier.global {
                    self.note_free(&identifier.name);
                    if self.seen.insert(identifier.name.clone()) {
                        self.result.all_deps.push(identifier.name.clone());
                    }
                } else {
                    self.note_use(&identifier.name, expr.span);
                    self.record(&identifier.name, identifier.name.clone());
                }
            }
            ExprKind::Template(template) => {
                for part in &template.expressions {
                    self.expression(part);
                }
            }
            ExprKind::Unary(unary) => self.expression(&unary.argument),
            ExprKind::Binary(binary) => {
                self.expression(&binary.left);
                self.expression(&binary.right);
            }
            ExprKind::Assignment(assignment) => {
                if assignment.operator.binary().is_some() {
                    self.expression(&assignment.target);
                } else {
                    self.assignment_target(&assignment.target);
                }
                self.expression(&assignment.value);
            }
            ExprKind::Update(update) => self.expression(&update.argument),
            ExprKind::Sequence(items) | ExprKind::Array(items) => {
                for item in items {
                    self.expression(item);
                }
            }
            ExprKind::Conditional(conditional) => {
                self.expression(&conditional.test);
                self.expression(&conditional.consequent);
                self.expression(&conditional.alternate);
            }
            ExprKind::Invocation(call) => {
                self.callee(&call.callee);
                for argument in &call.arguments {
                    self.expression(argument);
                }
            }
            ExprKind::Member(_) | ExprKind::CalculatedMember(_) => self.member(expr),
            ExprKind::Object(properties) => {
                for property in properties {
                    match property {
                        ObjectProperty::Property { key, value } => {
                            if let PropertyName::Computed(key) = key {
                                self.expression(key);
                            }
                            self.expression(value);
                        }
                        ObjectProperty::Spread(value) => self.expression(value),
                    }
                }
            }
            ExprKind::Spread(argument) => self.expression(argument),
            ExprKind::Arrow(function) => self.function(function),
            ExprKind::Destructure(destructure) => {
                for name in destructure.pattern.bound_names() {
                    if self.classify(&name.name) == Binding::Free {
                        self.note_free(&name.name);
                    }
                }
                self.expression(&destructure.value);
            }
        }
    }

    /// Left side of a plain assignment: writes are not dependencies.
    fn assignment_target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Identifier(identifier) => {
                self.note_use(&identifier.name, target.span);
                if identifier.global || self.classify(&identifier.name) == Binding::Free {
                    self.note_free(&identifier.name);
                }
            }
            ExprKind::Member(member) => self.expression(&member.object),
            ExprKind::CalculatedMember(member) => {
                self.expression(&member.object);
                self.expression(&member.property);
            }
            _ => self.expression(target),
        }
    }

    fn callee(&mut self, callee: &Expr) {
        let ExprKind::Member(member) = &callee.kind else {
            self.expression(callee);
            return;
        };
        match self.flatten(&member.object) {
            Some(chain) => {
                self.note_use(&chain.root, callee.span);
                let path = if self.tracked.is_tracked(&chain.path, &member.property) {
                    format!("{}.{}", chain.path, member.property)
                } else {
                    chain.path
                };
                self.record(&chain.root, path);
                for key in chain.keys {
                    self.expression(key);
                }
            }
            None => self.expression(&member.object),
        }
    }

    fn member(&mut self, expr: &Expr) {
        if let Some(chain) = self.flatten(expr) {
            self.note_use(&chain.root, expr.span);
            self.record(&chain.root, chain.path);
            for key in chain.keys {
                self.expression(key);
            }
            return;
        }
        match &expr.kind {
            ExprKind::Member(member) => self.expression(&member.object),
            ExprKind::CalculatedMember(member) => {
                self.expression(&member.object);
                self.expression(&member.property);
            }
            _ => self.expression(expr),
        }
    }

    /// Flatten a member chain rooted at an identifier into one path.
    fn flatten<'e>(&self, expr: &'e Expr) -> Option<MemberChain<'e>> {
        match &expr.kind {
            ExprKind::Identifier(identifier) if !identifier.global => Some(MemberChain {
                root: identifier.name.clone(),
                path: identifier.name.clone(),
                keys: Vec::new(),
            }),
            ExprKind::Member(member) => {
                let mut chain = self.flatten(&member.object)?;
                chain.path.push('.');
                chain.path.push_str(&member.property);
                Some(chain)
            }
            ExprKind::CalculatedMember(member) => {
                let mut chain = self.flatten(&member.object)?;
                match &member.property.kind {
                    ExprKind::Literal(Literal::Number(n)) => {
                        chain.path.push_str(&format!("['{}']", number_to_string(*n)));
                    }
                    ExprKind::Literal(Literal::String(s)) => {
                        chain.path.push_str(&format!("['{}']", s));
                    }
                    ExprKind::Identifier(key) => {
                        chain.path.push_str(&format!("[{}]", key.name));
                        chain.keys.push(&member.property);
                    }
                    _ => return None,
                }
                Some(chain)
            }
            _ => None,
        }
    }
}

struct MemberChain<'e> {
    root: String,
    path: String,
    /// Identifier keys inside the chain, still read on their own.
    keys: Vec<&'e Expr>,
}

/// Names a top-level statement declares, with their kind and site.
fn declared_names(statement: &Stmt) -> Vec<(String, &'static str, Span)> {
    match &statement.kind {
        StmtKind::Declaration(decl) => decl
            .declarators
            .iter()
            .flat_map(|declarator| declarator.pattern.bound_names())
            .map(|name| (name.name.clone(), decl.kind.as_str(), name.span))
            .collect(),
        StmtKind::Function(function) => {
            vec![(function.name.name.clone(), "function", function.name.span)]
        }
        StmtKind::Import(import) => import
            .specifiers
            .iter()
            .map(|specifier| (specifier.local.name.clone(), "import", specifier.local.span))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_statements};

    fn deps(source: &str) -> Vec<String> {
        resolve_expression(&parse_expression(source).unwrap(), &TrackedApis::new()).all_deps
    }

    #[test]
    fn test_free_identifiers() {
        assert_eq!(deps("x + y"), vec!["x", "y"]);
        assert_eq!(deps("x + x * 2"), vec!["x"]);
        assert_eq!(deps("(x) => x + y"), vec!["y"]);
        assert_eq!(deps("([a, { b }], ...rest) => a + b + rest.length + c"), vec!["c"]);
    }

    #[test]
    fn test_member_paths() {
        assert_eq!(deps("a.b[0].c"), vec!["a.b['0'].c"]);
        assert_eq!(deps("a['key'].b"), vec!["a['key'].b"]);
        assert_eq!(deps("a[i].b"), vec!["a[i].b", "i"]);
        assert_eq!(deps("a.b[i + 1].c"), vec!["a.b", "i"]);
        assert_eq!(deps("(a => a.b.c)"), Vec::<String>::new());
    }

    #[test]
    fn test_method_calls() {
        assert_eq!(deps("items.filter(x => x.done).length"), vec!["items"]);
        assert_eq!(deps("user.profile.format(prefix)"), vec!["user.profile", "prefix"]);

        let mut tracked = TrackedApis::new();
        tracked.track("store", "get");
        let scope = resolve_expression(&parse_expression("store.get(key)").unwrap(), &tracked);
        assert_eq!(scope.all_deps, vec!["store.get", "key"]);
    }

    #[test]
    fn test_track_object() {
        let mut api = crate::object::ScriptObject::new();
        api.set(
            "now",
            Value::function(crate::object::Function::native("now", |_, _| Ok(Value::Undefined))),
        );
        api.set("version", Value::from(2));
        let mut tracked = TrackedApis::new();
        tracked.track_object("clock", &Value::object(api));
        assert!(tracked.is_tracked("clock", "now"));
        assert!(!tracked.is_tracked("clock", "version"));
    }

    #[test]
    fn test_assignment_targets_are_not_dependencies() {
        let scope = resolve_expression(&parse_expression("total = price * 2").unwrap(), &TrackedApis::new());
        assert_eq!(scope.all_deps, vec!["price"]);
        assert_eq!(scope.top_level_names.get("total"), Some(&NameSite::Free));
        assert_eq!(deps("count += step"), vec!["count", "step"]);
        assert_eq!(deps("state.items[index] = value"), vec!["state.items", "index", "value"]);
    }

    #[test]
    fn test_top_level_declarations() {
        let statements = parse_statements(
            "let total = price * qty;\n\
             const label = `${total} ${currency}`;\n\
             function reset() { total = 0; return reset; }",
        )
        .unwrap();
        let scope = resolve_statements(&statements, &TrackedApis::new());

        assert_eq!(scope.top_level_deps["total"], vec!["price", "qty"]);
        assert_eq!(scope.top_level_deps["label"], vec!["total", "currency"]);
        assert!(scope.top_level_deps["reset"].is_empty());
        assert_eq!(scope.all_deps, vec!["price", "qty", "currency"]);
        assert!(matches!(
            scope.top_level_names["label"],
            NameSite::Declared { kind: "const", .. }
        ));
        assert_eq!(scope.top_level_names["price"], NameSite::Free);
    }

    #[test]
    fn test_hoisted_block_names() {
        let statements = parse_statements(
            "function make() { const get = () => value; let value = 1; return { get }; }",
        )
        .unwrap();
        let scope = resolve_statements(&statements, &TrackedApis::new());
        assert!(scope.all_deps.is_empty());
    }

    #[test]
    fn test_catch_and_loop_bindings() {
        let statements = parse_statements(
            "for (const item of items) { seen.push(item); }\n\
             try { run(); } catch (e) { report(e); }",
        )
        .unwrap();
        let scope = resolve_statements(&statements, &TrackedApis::new());
        assert_eq!(scope.all_deps, vec!["items", "seen", "run", "report"]);
    }

    #[test]
    fn test_serialization() {
        let scope = resolve_statements(&parse_statements("let a = b;").unwrap(), &TrackedApis::new());
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["topLevelNames"]["b"], serde_json::json!(true));
        assert_eq!(json["topLevelNames"]["a"]["kind"], "let");
        assert_eq!(json["topLevelDeps"]["a"], serde_json::json!(["b"]));
        assert_eq!(json["allDeps"], serde_json::json!(["b"]));
    }
}
