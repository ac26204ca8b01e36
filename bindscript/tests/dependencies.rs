//! Reactive dependency extraction over expressions and handler bodies.

use bindscript::{parse_expression, parse_statements, resolve_expression, resolve_statements, TrackedApis};

fn expression_deps(source: &str) -> Vec<String> {
    resolve_expression(&parse_expression(source).unwrap(), &TrackedApis::new()).all_deps
}

fn statement_deps(source: &str) -> Vec<String> {
    resolve_statements(&parse_statements(source).unwrap(), &TrackedApis::new()).all_deps
}

#[test]
fn free_identifiers_are_dependencies() {
    assert_eq!(expression_deps("x + y"), vec!["x", "y"]);
    assert_eq!(expression_deps("(x) => x + y"), vec!["y"]);
    assert_eq!(expression_deps("`${first} ${last}`"), vec!["first", "last"]);
    assert_eq!(expression_deps("cond ? a : b ?? c"), vec!["cond", "a", "b", "c"]);
}

#[test]
fn member_chains_flatten_into_one_path() {
    assert_eq!(expression_deps("a.b[0].c"), vec!["a.b['0'].c"]);
    assert_eq!(expression_deps("a?.b?.[key]"), vec!["a.b[key]", "key"]);
    assert_eq!(expression_deps("rows[rows.length - 1].id"), vec!["rows", "rows.length"]);
}

#[test]
fn switch_sees_enclosing_declarations() {
    assert!(statement_deps("let x = 2; switch (x) { case 2: z = x; }").is_empty());
    assert_eq!(statement_deps("switch (x) { case 2: z = x; }"), vec!["x"]);
    assert_eq!(
        statement_deps("switch (mode) { case 'a': let local = 1; break; default: y = local }"),
        vec!["mode"]
    );
}

#[test]
fn declarations_shadow_before_their_initializers() {
    assert!(statement_deps("const f = () => f();").is_empty());
    assert!(statement_deps("function walk(n) { return n ? walk(n - 1) : 0 }").is_empty());
    assert_eq!(statement_deps("{ let inner = 1; } inner;"), vec!["inner"]);
}

#[test]
fn parameters_loops_and_catch_bind_names() {
    assert_eq!(
        statement_deps(
            "for (let i = 0; i < limit; i++) { sum += i }\n\
             for (const { id } of list) { seen[id] = true }\n\
             try { risky() } catch ({ message }) { log(message) }"
        ),
        vec!["limit", "sum", "list", "seen", "risky", "log"]
    );
}

#[test]
fn tracked_apis_record_method_paths() {
    let mut tracked = TrackedApis::new();
    tracked.track("$state", "get");
    tracked.track("api.users", "find");

    let source = "$state.get('count') + api.users.find(id).name + api.users.count()";
    let scope = resolve_expression(&parse_expression(source).unwrap(), &tracked);
    assert_eq!(scope.all_deps, vec!["$state.get", "api.users.find", "id", "api.users"]);
}

#[test]
fn per_declaration_dependencies() {
    let statements = parse_statements(
        "let price = base * rate;\n\
         let [low, high] = range(price);\n\
         function describe() { return `${low}-${high} ${unit}` }",
    )
    .unwrap();
    let scope = resolve_statements(&statements, &TrackedApis::new());

    assert_eq!(scope.top_level_deps["price"], vec!["base", "rate"]);
    assert_eq!(scope.top_level_deps["low"], vec!["range", "price"]);
    assert_eq!(scope.top_level_deps["high"], scope.top_level_deps["low"]);
    assert_eq!(scope.top_level_deps["describe"], vec!["low", "high", "unit"]);
    assert_eq!(scope.all_deps, vec!["base", "rate", "range", "unit"]);
    assert!(scope.depends_on("unit"));
    assert!(!scope.depends_on("price"));
}
