//! Suspending the async processor on pending host results and resuming it.

use std::cell::RefCell;
use std::rc::Rc;

use bindscript::value::PendingId;
use bindscript::{
    parse_statements, EngineConfig, EvaluationContext, ProcessorMode, ProcessorState, ScriptError,
    StatementProcessor, ThreadId, Value,
};

/// Requests issued by scripts through the `fetch` native.
type Requests = Rc<RefCell<Vec<(PendingId, Value)>>>;

fn session() -> (EvaluationContext, ThreadId, Requests) {
    let mut ctx = EvaluationContext::with_builtins(EngineConfig::default());
    let thread = ctx.create_thread();
    let requests: Requests = Rc::default();
    let log = requests.clone();
    ctx.define_native("fetch", move |call, args| {
        let pending = call.ctx.create_pending();
        if let Value::Pending(id) = pending {
            log.borrow_mut().push((id, args.first().cloned().unwrap_or_default()));
        }
        Ok(pending)
    });
    (ctx, thread, requests)
}

fn processor(thread: ThreadId, mode: ProcessorMode, source: &str) -> StatementProcessor {
    StatementProcessor::new(mode, thread, parse_statements(source).unwrap())
}

fn suspended_on(state: ProcessorState) -> PendingId {
    match state {
        ProcessorState::Suspended(id) => id,
        other => panic!("expected suspension, got {:?}", other),
    }
}

#[test]
fn suspends_and_resumes_with_value() {
    let (mut ctx, thread, requests) = session();
    let mut p = processor(
        thread,
        ProcessorMode::Async,
        "let before = 1; let user = fetch('/user'); let greeting = 'Hi ' + user.name;",
    );

    let id = suspended_on(p.run(&mut ctx).unwrap());
    assert_eq!(requests.borrow()[0].1.to_display_string(), "/user");
    assert_eq!(ctx.lookup(thread, "before").to_number(), 1.0);
    assert!(ctx.lookup(thread, "greeting").is_undefined());

    let user = Value::from_json(&serde_json::json!({ "name": "Ada" }));
    assert_eq!(p.resume(&mut ctx, id, Ok(user)).unwrap(), ProcessorState::Completed);
    assert_eq!(ctx.lookup(thread, "greeting").to_display_string(), "Hi Ada");
}

#[test]
fn sync_processor_treats_pending_as_value() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(
        thread,
        ProcessorMode::Sync,
        "let user = fetch('/user'); let kind = typeof user; let name = user.name;",
    );
    assert_eq!(p.run(&mut ctx).unwrap(), ProcessorState::Completed);
    assert_eq!(ctx.lookup(thread, "kind").to_display_string(), "object");
    assert!(ctx.lookup(thread, "name").is_undefined());
}

#[test]
fn suspension_inside_script_functions_and_loops() {
    let (mut ctx, thread, requests) = session();
    let mut p = processor(
        thread,
        ProcessorMode::Async,
        "function load(n) { const r = fetch(n); return r * 2; }\n\
         let total = 0;\n\
         for (let i = 1; i <= 3; i++) { total += load(i); }",
    );

    let mut state = p.run(&mut ctx).unwrap();
    let mut resumed = 0;
    while let ProcessorState::Suspended(id) = state {
        let snapshot = p.snapshot();
        assert_eq!(snapshot.awaiting, Some(id));
        assert_eq!(snapshot.frames.len(), 1, "suspended inside load()");

        let arg = requests.borrow().last().map(|(_, arg)| arg.to_number()).unwrap();
        state = p.resume(&mut ctx, id, Ok(Value::from(arg * 10.0))).unwrap();
        resumed += 1;
    }

    assert_eq!(resumed, 3);
    assert_eq!(ctx.lookup(thread, "total").to_number(), 120.0);
    assert!(p.snapshot().frames.is_empty());
}

#[test]
fn rejection_is_catchable() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(
        thread,
        ProcessorMode::Async,
        "let status = 'start', error;\n\
         try { status = 'waiting'; fetch('/fail'); status = 'unreachable' }\n\
         catch (e) { error = e }\n\
         finally { status += ' done' }",
    );

    let id = suspended_on(p.run(&mut ctx).unwrap());
    let state = p.resume(&mut ctx, id, Err(Value::from("offline"))).unwrap();
    assert_eq!(state, ProcessorState::Completed);
    assert_eq!(ctx.lookup(thread, "error").to_display_string(), "offline");
    assert_eq!(ctx.lookup(thread, "status").to_display_string(), "waiting done");
}

#[test]
fn uncaught_rejection_reaches_host() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(thread, ProcessorMode::Async, "fetch('/fail');");
    let id = suspended_on(p.run(&mut ctx).unwrap());
    let err = p.resume(&mut ctx, id, Err(Value::from(500))).unwrap_err();
    assert!(matches!(err, ScriptError::Thrown(Value::Number(n)) if n == 500.0));
    assert_eq!(p.state(), ProcessorState::Completed);
}

#[test]
fn resume_checks_the_awaited_id() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(thread, ProcessorMode::Async, "let a = fetch(1);");
    let id = suspended_on(p.run(&mut ctx).unwrap());

    let err = p.resume(&mut ctx, PendingId(id.0 + 100), Ok(Value::Null)).unwrap_err();
    assert!(matches!(err, ScriptError::Internal(_)));
    assert_eq!(p.state(), ProcessorState::Suspended(id));
    assert_eq!(p.run(&mut ctx).unwrap(), ProcessorState::Suspended(id));
}

#[test]
fn snapshot_is_serializable_mid_flight() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(thread, ProcessorMode::Async, "let x = [1, fetch('/a'), 3];");
    let id = suspended_on(p.run(&mut ctx).unwrap());

    let snapshot = p.snapshot();
    assert_eq!(snapshot.values.len(), 1, "array element evaluated before the call");
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["mode"], "Async");
    assert_eq!(json["state"]["Suspended"], serde_json::json!(id.0));
    assert_eq!(json["awaiting"], serde_json::json!(id.0));
    assert!(!json["queue"].as_array().unwrap().is_empty());

    p.resume(&mut ctx, id, Ok(Value::from(2))).unwrap();
    assert_eq!(ctx.lookup(thread, "x").to_display_string(), "1,2,3");
}

#[test]
fn collection_keeps_suspended_state_alive() {
    let (mut ctx, thread, _) = session();
    let mut p = processor(
        thread,
        ProcessorMode::Async,
        "function outer() { let hidden = 5; const read = () => hidden; const v = fetch(); return read() + v; }\n\
         let r = outer();",
    );
    let id = suspended_on(p.run(&mut ctx).unwrap());
    ctx.collect_garbage(&p.live_values());
    p.resume(&mut ctx, id, Ok(Value::from(1))).unwrap();
    assert_eq!(ctx.lookup(thread, "r").to_number(), 6.0);
}

#[test]
fn child_threads_read_through_parent() {
    let (mut ctx, thread, _) = session();
    let mut setup = processor(thread, ProcessorMode::Sync, "let shared = 41;");
    setup.run(&mut ctx).unwrap();

    let handler = ctx.create_child_thread(thread);
    let mut p = processor(handler, ProcessorMode::Async, "let own = shared + 1; shared = own;");
    assert_eq!(p.run(&mut ctx).unwrap(), ProcessorState::Completed);
    assert_eq!(ctx.lookup(thread, "shared").to_number(), 42.0);
    assert!(ctx.lookup(thread, "own").is_undefined());
}
