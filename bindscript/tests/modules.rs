//! Module graph resolution over in-memory sources.

use std::collections::HashMap;

use bindscript::ast::StmtKind;
use bindscript::{resolve_modules, DiagnosticCode};

struct Sources(HashMap<&'static str, &'static str>);

impl Sources {
    fn new(modules: &[(&'static str, &'static str)]) -> Self {
        Sources(modules.iter().copied().collect())
    }

    fn resolver(&self) -> impl FnMut(&str, &str) -> Option<String> + '_ {
        move |_parent: &str, name: &str| self.0.get(name).map(|source| source.to_string())
    }
}

#[test]
fn three_module_cycle_resolves() {
    let sources = Sources::new(&[
        ("b", "import { c } from 'c'; export const b = () => c;"),
        ("c", "import { a } from 'main'; export function c() { return a; }"),
    ]);
    let graph = resolve_modules("main", "import { b } from 'b'; export const a = 1;", sources.resolver()).unwrap();

    assert_eq!(graph.len(), 3);
    let c = graph.module("c").unwrap();
    assert_eq!(c.imports[0].module, "main");
    assert!(matches!(c.imports[0].declaration.kind, StmtKind::Declaration(_)));
    assert!(c.scope.all_deps.is_empty());
}

#[test]
fn shared_import_is_parsed_once() {
    let mut calls = Vec::new();
    let graph = resolve_modules(
        "main",
        "import { x } from 'left'; import { y } from 'right';",
        |parent: &str, name: &str| {
            calls.push(format!("{}->{}", parent, name));
            Some(match name {
                "left" => "import { z } from 'shared'; export const x = z;".to_string(),
                "right" => "import { z } from 'shared'; export const y = z;".to_string(),
                _ => "export const z = 0;".to_string(),
            })
        },
    )
    .unwrap();
    assert_eq!(graph.len(), 4);
    assert_eq!(calls, vec!["main->left", "main->right", "left->shared"]);
}

#[test]
fn errors_are_grouped_per_module() {
    let sources = Sources::new(&[
        ("dup", "export const a = 1; export function a() {}"),
        ("nested", "function f() { export const inner = 1; }"),
        ("vars", "function g() { var local = 1; return local; }"),
    ]);
    let errors = resolve_modules(
        "main",
        "import { a } from 'dup'; import { f } from 'nested'; import { g } from 'vars'; import { q } from 'gone';",
        sources.resolver(),
    )
    .unwrap_err();

    let codes = |module: &str| -> Vec<DiagnosticCode> { errors[module].iter().map(|d| d.code).collect() };
    assert_eq!(codes("main"), vec![DiagnosticCode::W022, DiagnosticCode::W023, DiagnosticCode::W023]);
    assert_eq!(codes("dup"), vec![DiagnosticCode::W021]);
    assert_eq!(codes("nested"), vec![DiagnosticCode::W030]);
    assert_eq!(codes("vars"), vec![DiagnosticCode::W027]);
    assert!(errors["main"][0].message.contains("gone"));
}

#[test]
fn module_scope_reports_free_names() {
    let graph = resolve_modules(
        "main",
        "import { format } from 'fmt'; export const label = format(value);",
        Sources::new(&[("fmt", "export const format = (v) => `${v}`;")]).resolver(),
    )
    .unwrap();
    let main = graph.root().unwrap();
    assert_eq!(main.scope.all_deps, vec!["value"]);
    assert_eq!(main.scope.top_level_deps["label"], vec!["format", "value"]);
}
