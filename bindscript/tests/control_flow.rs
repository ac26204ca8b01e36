//! Control flow through the statement queue, checked under both processors.

use bindscript::{
    parse_statements, EngineConfig, EvaluationContext, ProcessorMode, ProcessorState, ScriptError,
    ScriptResult, StatementProcessor, Value,
};

const MODES: [ProcessorMode; 2] = [ProcessorMode::Sync, ProcessorMode::Async];

struct Run {
    ctx: EvaluationContext,
    processor: StatementProcessor,
    result: ScriptResult<ProcessorState>,
}

impl Run {
    fn new(mode: ProcessorMode, source: &str) -> Self {
        let mut ctx = EvaluationContext::with_builtins(EngineConfig::default());
        let thread = ctx.create_thread();
        let mut processor = StatementProcessor::new(mode, thread, parse_statements(source).unwrap());
        let result = processor.run(&mut ctx);
        Run { ctx, processor, result }
    }

    fn ok(mode: ProcessorMode, source: &str) -> Self {
        let run = Self::new(mode, source);
        if let Err(e) = &run.result {
            panic!("{:?} run failed: {}", mode, e);
        }
        run
    }

    fn get(&self, name: &str) -> Value {
        self.ctx.lookup(self.processor.thread(), name)
    }

    fn text(&self, name: &str) -> String {
        self.get(name).to_display_string()
    }
}

#[test]
fn break_runs_finally_before_leaving_loop() {
    for mode in MODES {
        let run = Run::ok(mode, "let x = 0; while (true) { try { break; x = -4 } finally { x = 3 } }");
        assert_eq!(run.get("x").to_number(), 3.0, "{:?}", mode);
    }
}

#[test]
fn return_runs_every_enclosing_finally() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let x = 0; try { try { return 123 } finally { x++ } } finally { x++ } x = 100;",
        );
        assert_eq!(run.processor.return_value(&run.ctx).to_number(), 123.0);
        assert_eq!(run.get("x").to_number(), 2.0);
    }
}

#[test]
fn return_in_finally_overrides() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "function f() { try { return 'try' } finally { return 'finally' } }\n\
             let r = f();",
        );
        assert_eq!(run.text("r"), "finally");
    }
}

#[test]
fn error_in_catch_replaces_original() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let got, order = '';\n\
             try {\n\
               try { throw 1 } catch (e) { order += 'c'; throw e + 1 } finally { order += 'f' }\n\
             } catch (e) { got = e }",
        );
        assert_eq!(run.get("got").to_number(), 2.0);
        assert_eq!(run.text("order"), "cf");
    }
}

#[test]
fn uncaught_throw_reaches_host() {
    for mode in MODES {
        let run = Run::new(mode, "let a = 1; throw { code: 7 }; a = 2;");
        match run.result {
            Err(ScriptError::Thrown(Value::Object(object))) => {
                assert_eq!(object.borrow().get("code").to_number(), 7.0)
            }
            other => panic!("expected thrown object, got {:?}", other),
        }
    }
}

#[test]
fn catch_binding_destructures() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let code, kind;\n\
             try { throw { code: 404, detail: { kind: 'missing' } } }\n\
             catch ({ code: c, detail: { kind: k } }) { code = c; kind = k }",
        );
        assert_eq!(run.get("code").to_number(), 404.0);
        assert_eq!(run.text("kind"), "missing");
    }
}

#[test]
fn const_violation_stops_before_assignment() {
    for mode in MODES {
        let run = Run::new(mode, "const x = 3; x = 4;");
        assert!(matches!(run.result, Err(ScriptError::Type(_))), "{:?}", mode);
        assert_eq!(run.get("x").to_number(), 3.0);
    }
}

#[test]
fn closures_see_later_declarations() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "function make() {\n\
               const read = () => value;\n\
               let value = 41;\n\
               return { read, bump: () => ++value };\n\
             }\n\
             const counter = make();\n\
             counter.bump();\n\
             let seen = counter.read();",
        );
        assert_eq!(run.get("seen").to_number(), 42.0);
    }
}

#[test]
fn labeled_break_and_continue() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let pairs = [];\n\
             outer: for (let i = 0; i < 3; i++) {\n\
               for (let j = 0; j < 3; j++) {\n\
                 if (j === 1) continue outer;\n\
                 if (i === 2) break outer;\n\
                 pairs.push(`${i}${j}`);\n\
               }\n\
             }\n\
             let s = pairs.join(' ');",
        );
        assert_eq!(run.text("s"), "00 10");
    }
}

#[test]
fn labeled_block_break() {
    for mode in MODES {
        let run = Run::ok(mode, "let x = 1; block: { x = 2; break block; x = 3 } x *= 10;");
        assert_eq!(run.get("x").to_number(), 20.0);
    }
}

#[test]
fn switch_falls_through() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let r = '';\n\
             switch (2) { case 1: r += 'a'; case 2: r += 'b'; case 3: r += 'c'; break; default: r += 'd' }\n\
             let d = '';\n\
             switch ('zz') { case 'a': d += 'a'; default: d += 'd'; case 'b': d += 'b' }",
        );
        assert_eq!(run.text("r"), "bc");
        assert_eq!(run.text("d"), "db");
    }
}

#[test]
fn per_iteration_let_bindings() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let fs = [];\n\
             for (let i = 0; i < 3; i++) { fs.push(() => i) }\n\
             let out = fs.map(f => f()).join();",
        );
        assert_eq!(run.text("out"), "0,1,2");
    }
}

#[test]
fn for_in_and_for_of() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let keys = '', sum = 0, last;\n\
             for (const k in { a: 1, b: 2 }) keys += k;\n\
             for (const [n, m] of [[1, 2], [3, 4]]) { if (n > 2) continue; sum += n * m }\n\
             for (last of 'abc');",
        );
        assert_eq!(run.text("keys"), "ab");
        assert_eq!(run.get("sum").to_number(), 2.0);
        assert_eq!(run.text("last"), "c");
    }
}

#[test]
fn do_while_runs_once() {
    for mode in MODES {
        let run = Run::ok(mode, "let n = 0; do { n++ } while (false); do n += 10; while (n < 30)");
        assert_eq!(run.get("n").to_number(), 31.0);
    }
}

#[test]
fn recursion_and_hoisting() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "let r = fib(10);\n\
             function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) }",
        );
        assert_eq!(run.get("r").to_number(), 55.0);
    }
}

#[test]
fn banned_functions_fail_in_both_modes() {
    for mode in MODES {
        let run = Run::new(mode, "setTimeout(() => {}, 10)");
        assert!(matches!(run.result, Err(ScriptError::NotAllowed(_))));

        let run = Run::ok(mode, "let msg; try { setInterval(() => {}) } catch (e) { msg = e.message }");
        assert_eq!(run.text("msg"), "'setInterval' is not allowed to call");
    }
}

#[test]
fn var_in_function_body_is_rejected() {
    assert!(parse_statements("function f() { var a = 1; return a }").is_err());
    assert!(parse_statements("var a = 1; function f() { let b = a; return b }").is_ok());
}

#[test]
fn diagnostics_match_between_modes() {
    let source = "let t = 0; for (let i = 0; i < 4; i++) { for (const c of 'ab') { t++ } }";
    let sync = Run::ok(ProcessorMode::Sync, source);
    let run = Run::ok(ProcessorMode::Async, source);
    assert_eq!(sync.get("t").to_number(), 8.0);
    assert_eq!(run.get("t").to_number(), 8.0);
    assert_eq!(sync.processor.diagnostics().max_loops, 4);
    assert_eq!(
        sync.processor.diagnostics().max_blocks,
        run.processor.diagnostics().max_blocks
    );
}

#[test]
fn const_check_precedes_right_hand_side() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "const x = 3; let y = 0, msg;\n\
             function five() { return 5 }\n\
             try { x += (y = five()) } catch (e) { msg = e.message }\n\
             try { x = (y = 7) } catch (e) {}\n\
             x ??= (y = 9);",
        );
        assert_eq!(run.text("msg"), "Assignment to constant variable 'x'", "{:?}", mode);
        assert_eq!(run.get("y").to_number(), 0.0, "{:?}", mode);
        assert_eq!(run.get("x").to_number(), 3.0);
    }
}

#[test]
fn oversized_array_writes_are_catchable() {
    for mode in MODES {
        let run = Run::ok(
            mode,
            "const a = [1];\n\
             let index, length;\n\
             try { a[4000000000] = 1 } catch (e) { index = e.name + ': ' + e.message }\n\
             try { a.length = 4294967295 } catch (e) { length = e.message }\n\
             a[2] = 3;",
        );
        assert_eq!(run.text("index"), "RangeError: Invalid array length", "{:?}", mode);
        assert_eq!(run.text("length"), "Invalid array length");
        assert_eq!(run.text("a"), "1,,3");
    }
}

/// Run a second script on a thread that already ran one.
fn run_again(run: &mut Run, mode: ProcessorMode, source: &str) -> StatementProcessor {
    let mut processor = StatementProcessor::new(mode, run.processor.thread(), parse_statements(source).unwrap());
    processor.run(&mut run.ctx).unwrap();
    processor
}

#[test]
fn return_value_belongs_to_one_run() {
    for mode in MODES {
        let mut run = Run::ok(mode, "return 5");
        assert_eq!(run.processor.return_value(&run.ctx).to_number(), 5.0);
        let second = run_again(&mut run, mode, "let a = 1;");
        assert!(second.return_value(&run.ctx).is_undefined(), "{:?}", mode);
    }
}

#[test]
fn aborted_run_closes_its_blocks() {
    for mode in MODES {
        let mut run = Run::new(mode, "let kept = 1; { let x = 1; throw 0 }");
        assert!(matches!(run.result, Err(ScriptError::Thrown(_))), "{:?}", mode);
        let second = run_again(&mut run, mode, "let seen = typeof x;");
        assert_eq!(run.ctx.lookup(second.thread(), "seen").to_display_string(), "undefined", "{:?}", mode);
        assert_eq!(run.text("kept"), "1");
    }
}
