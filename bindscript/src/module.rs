//! Module graph resolution.
//!
//! Starting from a root source, every `import` is resolved through a host
//! callback, parsed once and linked to the exporting declaration. Problems
//! are collected per module as [`ModuleDiagnostic`]s instead of failing on
//! the first one. Import cycles are fine: linking only needs every module
//! parsed, never evaluated.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use hashbrown::HashSet;
use serde::Serialize;

use crate::ast::{StmtKind, StmtList, StmtRef, VarKind};
use crate::error::ScriptError;
use crate::parser::parse_module;
use crate::resolver::{analyze_module, ResolutionScope, TrackedApis};
use crate::token::Span;

/// Module diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagnosticCode {
    /// Source failed to parse.
    W001,
    /// Name exported twice.
    W021,
    /// Import target could not be resolved.
    W022,
    /// Imported name is not exported by its module.
    W023,
    /// `var` inside a function, or a top-level `var` used from one.
    W027,
    /// `export` below the top level.
    W030,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One problem found in a module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDiagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
}

impl ModuleDiagnostic {
    fn new(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        ModuleDiagnostic {
            code,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ModuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Diagnostics keyed by module name.
pub type ModuleErrors = BTreeMap<String, Vec<ModuleDiagnostic>>;

/// An exported name and the declaration that introduces it.
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub declaration: StmtRef,
    pub span: Span,
}

/// An imported name linked to the exporting declaration.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    /// Name bound in the importing module.
    pub local: String,
    /// Name exported by `module`.
    pub imported: String,
    pub module: String,
    pub declaration: StmtRef,
}

/// One parsed module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub statements: StmtList,
    pub exports: BTreeMap<String, Export>,
    pub imports: Vec<ImportBinding>,
    /// Names and dependencies of the module body.
    pub scope: ResolutionScope,
}

/// Every module reachable from the root.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    root: String,
    modules: BTreeMap<String, Module>,
    /// Discovery order, root first.
    order: Vec<String>,
}

impl ModuleGraph {
    pub fn root(&self) -> Option<&Module> {
        self.modules.get(&self.root)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().filter_map(|name| self.modules.get(name))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

struct Pending {
    name: String,
    statements: StmtList,
    exports: BTreeMap<String, Export>,
    imports: Vec<(String, String, String, Span)>,
    scope: ResolutionScope,
}

/// Resolve the module graph of `root_source`.
///
/// `resolve(parent, module)` returns the source of `module` as imported
/// from `parent`, or `None` if it does not exist.
pub fn resolve_modules<F>(root_name: &str, root_source: &str, mut resolve: F) -> Result<ModuleGraph, ModuleErrors>
where
    F: FnMut(&str, &str) -> Option<String>,
{
    let tracked = TrackedApis::new();
    let mut errors = ModuleErrors::new();
    let mut parsed: BTreeMap<String, Pending> = BTreeMap::new();
    let mut order = Vec::new();
    let mut known: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();

    known.insert(root_name.to_string());
    queue.push_back((root_name.to_string(), root_source.to_string()));

    while let Some((name, source)) = queue.pop_front() {
        log::trace!("[Modules] parsing '{}'", name);
        let statements = match parse_module(&source) {
            Ok(statements) => statements,
            Err(e) => {
                let span = e.span().unwrap_or_default();
                report(&mut errors, &name, ModuleDiagnostic::new(DiagnosticCode::W001, parse_message(&e), span));
                continue;
            }
        };

        let mut diagnostics = Vec::new();
        let exports = collect_exports(&statements, &mut diagnostics);
        let (scope, facts) = analyze_module(&statements, &tracked);

        for span in facts.function_vars {
            diagnostics.push(ModuleDiagnostic::new(
                DiagnosticCode::W027,
                "'var' is not allowed inside a function, use 'let' or 'const'",
                span,
            ));
        }
        let top_level_vars = top_level_vars(&statements);
        for (var, span) in facts.top_level_uses {
            if top_level_vars.contains(&var) {
                diagnostics.push(ModuleDiagnostic::new(
                    DiagnosticCode::W027,
                    format!("Top-level 'var' {} cannot be used inside a function", var),
                    span,
                ));
            }
        }
        for (name, span) in facts.nested_exports {
            diagnostics.push(ModuleDiagnostic::new(
                DiagnosticCode::W030,
                format!("Export of '{}' must be at the top level of the module", name),
                span,
            ));
        }

        let mut imports = Vec::new();
        for statement in statements.iter() {
            let StmtKind::Import(import) = &statement.kind else {
                continue;
            };
            if !known.contains(&import.module) {
                match resolve(&name, &import.module) {
                    Some(source) => {
                        known.insert(import.module.clone());
                        queue.push_back((import.module.clone(), source));
                    }
                    None => {
                        diagnostics.push(ModuleDiagnostic::new(
                            DiagnosticCode::W022,
                            format!("Cannot resolve module '{}'", import.module),
                            statement.span,
                        ));
                        continue;
                    }
                }
            }
            for specifier in &import.specifiers {
                imports.push((
                    specifier.local.name.clone(),
                    specifier.imported.clone(),
                    import.module.clone(),
                    specifier.local.span,
                ));
            }
        }

        for diagnostic in diagnostics {
            report(&mut errors, &name, diagnostic);
        }
        order.push(name.clone());
        parsed.insert(
            name.clone(),
            Pending {
                name,
                statements,
                exports,
                imports,
                scope,
            },
        );
    }

    let mut modules = BTreeMap::new();
    for (name, pending) in &parsed {
        let mut imports = Vec::new();
        for (local, imported, module, span) in &pending.imports {
            // Targets that failed to parse are already reported.
            let Some(target) = parsed.get(module) else {
                continue;
            };
            match target.exports.get(imported) {
                Some(export) => imports.push(ImportBinding {
                    local: local.clone(),
                    imported: imported.clone(),
                    module: module.clone(),
                    declaration: export.declaration.clone(),
                }),
                None => report(
                    &mut errors,
                    name,
                    ModuleDiagnostic::new(
                        DiagnosticCode::W023,
                        format!("Module '{}' has no exported member '{}'", module, imported),
                        *span,
                    ),
                ),
            }
        }
        modules.insert(
            name.clone(),
            Module {
                name: pending.name.clone(),
                statements: pending.statements.clone(),
                exports: pending.exports.clone(),
                imports,
                scope: pending.scope.clone(),
            },
        );
    }

    if !errors.is_empty() {
        log::debug!("[Modules] {} of {} modules have diagnostics", errors.len(), order.len());
        return Err(errors);
    }
    log::debug!("[Modules] resolved {} modules from '{}'", modules.len(), root_name);
    Ok(ModuleGraph {
        root: root_name.to_string(),
        modules,
        order,
    })
}

fn report(errors: &mut ModuleErrors, module: &str, diagnostic: ModuleDiagnostic) {
    errors.entry(module.to_string()).or_default().push(diagnostic);
}

fn parse_message(error: &ScriptError) -> String {
    error.message().into_owned()
}

/// Export table of the top-level statements; duplicates are W021.
fn collect_exports(statements: &StmtList, diagnostics: &mut Vec<ModuleDiagnostic>) -> BTreeMap<String, Export> {
    let mut exports = BTreeMap::new();
    let mut add = |name: &str, span: Span, statement: &StmtRef| {
        if exports.contains_key(name) {
            diagnostics.push(ModuleDiagnostic::new(
                DiagnosticCode::W021,
                format!("Duplicate export '{}'", name),
                span,
            ));
            return;
        }
        exports.insert(
            name.to_string(),
            Export {
                name: name.to_string(),
                declaration: statement.clone(),
                span,
            },
        );
    };

    for statement in statements.iter() {
        match &statement.kind {
            StmtKind::Declaration(decl) if decl.exported => {
                for declarator in &decl.declarators {
                    for name in declarator.pattern.bound_names() {
                        add(&name.name, name.span, statement);
                    }
                }
            }
            StmtKind::Function(function) if function.exported => {
                add(&function.name.name, function.name.span, statement);
            }
            _ => {}
        }
    }
    exports
}

fn top_level_vars(statements: &StmtList) -> HashSet<String> {
    statements
        .iter()
        .filter_map(|statement| match &statement.kind {
            StmtKind::Declaration(decl) if decl.kind == VarKind::Var => Some(decl),
            _ => None,
        })
        .flat_map(|decl| decl.declarators.iter())
        .flat_map(|declarator| declarator.pattern.bound_names())
        .map(|name| name.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources<'a>(modules: &'a [(&'a str, &'a str)]) -> impl FnMut(&str, &str) -> Option<String> + 'a {
        move |_parent: &str, name: &str| {
            modules
                .iter()
                .find(|(module, _)| *module == name)
                .map(|(_, source)| source.to_string())
        }
    }

    fn codes(errors: &ModuleErrors, module: &str) -> Vec<DiagnosticCode> {
        errors[module].iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_resolve_graph() {
        let graph = resolve_modules(
            "main",
            "import { total, format as show } from 'lib'; const out = show(total);",
            sources(&[("lib", "export const total = 3; export function format(n) { return `${n}`; }")]),
        )
        .unwrap();

        assert_eq!(graph.len(), 2);
        let names: Vec<&str> = graph.modules().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["main", "lib"]);

        let main = graph.root().unwrap();
        assert_eq!(main.imports.len(), 2);
        assert_eq!(main.imports[1].local, "show");
        assert!(matches!(main.imports[1].declaration.kind, StmtKind::Function(_)));

        let lib = graph.module("lib").unwrap();
        assert_eq!(lib.exports.keys().collect::<Vec<_>>(), vec!["format", "total"]);
    }

    #[test]
    fn test_destructured_exports() {
        let graph = resolve_modules(
            "main",
            "export const { a, b: [c, ...d], e: { f } } = source;",
            sources(&[]),
        )
        .unwrap();
        let exports: Vec<&String> = graph.root().unwrap().exports.keys().collect();
        assert_eq!(exports, vec!["a", "c", "d", "f"]);
    }

    #[test]
    fn test_cycles_resolve() {
        let graph = resolve_modules(
            "a",
            "import { fromB } from 'b'; export const fromA = 1;",
            sources(&[("b", "import { fromA } from 'a'; export const fromB = () => fromA;")]),
        )
        .unwrap();
        assert_eq!(graph.module("b").unwrap().imports[0].module, "a");
    }

    #[test]
    fn test_diagnostics() {
        let errors = resolve_modules(
            "main",
            "import { x } from 'missing';\n\
             import { nope } from 'lib';\n\
             export const y = 1;\n\
             export let y = 2;\n\
             if (y) { export const z = 3; }",
            sources(&[("lib", "export const present = 1;")]),
        )
        .unwrap_err();
        assert_eq!(
            codes(&errors, "main"),
            vec![DiagnosticCode::W021, DiagnosticCode::W030, DiagnosticCode::W022, DiagnosticCode::W023]
        );
        assert!(!errors.contains_key("lib"));
    }

    #[test]
    fn test_var_rules() {
        let errors = resolve_modules(
            "main",
            "var count = 0;\nfunction bump() { var step = 1; count += step; }",
            sources(&[]),
        )
        .unwrap_err();
        let messages: Vec<String> = errors["main"].iter().map(|d| d.to_string()).collect();
        assert_eq!(codes(&errors, "main"), vec![DiagnosticCode::W027, DiagnosticCode::W027]);
        assert!(messages[1].contains("count"));
    }

    #[test]
    fn test_parse_failure() {
        let errors = resolve_modules("main", "import { a } from 'broken';", sources(&[("broken", "let = ;")]))
            .unwrap_err();
        assert_eq!(codes(&errors, "broken"), vec![DiagnosticCode::W001]);
        assert!(!errors.contains_key("main"));
    }

    #[test]
    fn test_diagnostics_serialize() {
        let diagnostic = ModuleDiagnostic::new(DiagnosticCode::W022, "Cannot resolve module 'x'", Span::default());
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["code"], "W022");
    }
}
