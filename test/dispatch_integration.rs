//! End-to-end dispatch tests against the host-facing surface.

use std::fs;
use std::sync::Arc;

use polycall::{ConfigStore, DispatchError, Runtime, RuntimeState, TypeTag, Value};

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("polycall_test_{}", name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_load_from_file_and_invoke() {
    let dir = scratch_dir("load_from_file");
    let script = dir.join("ducktype.expr");
    fs::write(
        &script,
        "fn multiply(left: int, right: int) -> long = left * right;\n\
         fn divide(left: double, right: double) -> double = left / right;\n\
         fn strcat(left: string, right: string) -> string = left + right;\n",
    )
    .unwrap();

    let runtime = Runtime::new();
    runtime.initialize().unwrap();
    runtime.load_from_file("expr", &[&script]).unwrap();

    let ret = runtime
        .call("multiply")
        .arg_tagged(TypeTag::Int, Value::Int(5))
        .arg_tagged(TypeTag::Int, Value::Int(15))
        .invoke()
        .unwrap();
    assert_eq!(ret.as_long(), Some(75));

    for n in 0..=10 {
        let ret = runtime
            .call("multiply")
            .arg_tagged(TypeTag::Int, Value::Int(7))
            .arg_tagged(TypeTag::Int, Value::Int(n))
            .invoke()
            .unwrap();
        assert_eq!(ret.as_long(), Some(i64::from(7 * n)));
    }

    let ret = runtime
        .call("divide")
        .arg_tagged(TypeTag::Double, Value::Double(64.0))
        .arg_tagged(TypeTag::Double, Value::Double(2.0))
        .invoke()
        .unwrap();
    assert_eq!(ret.as_double(), Some(32.0));

    let ret = runtime
        .call("strcat")
        .arg_tagged(TypeTag::String, Value::string("Hello "))
        .arg_tagged(TypeTag::String, Value::string("Universe"))
        .invoke()
        .unwrap();
    assert_eq!(ret.as_str(), Some("Hello Universe"));

    runtime.destroy().unwrap();
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_source_file_is_load_error() {
    let runtime = Runtime::new();
    runtime.initialize().unwrap();
    let err = runtime
        .load_from_file("expr", &["/nonexistent/ghost.expr"])
        .unwrap_err();
    assert!(matches!(err, DispatchError::Load(_)));
}

#[test]
fn test_unknown_tag_fails_rather_than_no_op() {
    let runtime = Runtime::new();
    runtime.initialize().unwrap();
    let err = runtime
        .load_from_memory("brainfuck", "unit", "whatever")
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::NoLoaderAvailable("brainfuck".to_string())
    );
}

#[test]
fn test_lifecycle_over_full_surface() {
    let runtime = Runtime::new();

    // Everything is gated before initialize.
    assert!(matches!(
        runtime.invoke_dynamic("f", vec![]).unwrap_err(),
        DispatchError::Lifecycle(RuntimeState::Uninitialized)
    ));
    assert!(matches!(
        runtime.load_from_memory("expr", "m", "fn f() = 1;").unwrap_err(),
        DispatchError::Lifecycle(_)
    ));

    runtime.initialize().unwrap();
    runtime.initialize().unwrap(); // idempotent
    runtime
        .load_from_memory("expr", "m", "fn f() -> long = 1;")
        .unwrap();
    assert_eq!(runtime.invoke_dynamic("f", vec![]).unwrap(), Value::Long(1));

    runtime.destroy().unwrap();
    assert!(matches!(
        runtime.invoke_dynamic("f", vec![]).unwrap_err(),
        DispatchError::Lifecycle(RuntimeState::Destroyed)
    ));

    // Re-initialization starts clean.
    runtime.initialize().unwrap();
    assert_eq!(
        runtime.invoke_dynamic("f", vec![]).unwrap_err(),
        DispatchError::FunctionNotFound("f".to_string())
    );
}

#[test]
fn test_shadowing_across_files() {
    let dir = scratch_dir("shadowing");
    let first = dir.join("first.expr");
    let second = dir.join("second.expr");
    fs::write(&first, "fn f() -> string = \"first\";").unwrap();
    fs::write(&second, "fn f() -> string = \"second\";").unwrap();

    let runtime = Runtime::new();
    runtime.initialize().unwrap();
    runtime.load_from_file("expr", &[&first]).unwrap();
    runtime.load_from_file("expr", &[&second]).unwrap();

    let ret = runtime.invoke_dynamic("f", vec![]).unwrap();
    assert_eq!(ret.as_str(), Some("second"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_configured_runtime_reaches_loaders() {
    let mut config = ConfigStore::new("host");
    config.set(
        "native_search_paths",
        Value::Array(vec![Value::string("/opt/polycall/lib")]),
    );

    let runtime = Runtime::with_config(config);
    runtime.initialize().unwrap();
    // The native loader initializes against the configured store; a
    // bogus manifest still fails cleanly afterwards.
    let err = runtime
        .load_from_memory("native", "ghost", r#"{ "library": "libnope-polycall.so" }"#)
        .unwrap_err();
    assert!(matches!(err, DispatchError::Load(_)));
}

#[test]
fn test_concurrent_mixed_workload() {
    let runtime = Arc::new(Runtime::new());
    runtime.initialize().unwrap();
    runtime
        .load_from_memory(
            "expr",
            "math",
            "fn square(n: long) -> long = n * n;\n\
             fn half(n: double) -> double = n / 2.0;",
        )
        .unwrap();

    let mut threads = Vec::new();
    for t in 0..8 {
        let runtime = Arc::clone(&runtime);
        threads.push(std::thread::spawn(move || {
            for n in 1..=25i64 {
                let ret = runtime
                    .invoke_dynamic("square", vec![Value::Long(n)])
                    .unwrap();
                assert_eq!(ret, Value::Long(n * n));
            }
            // Every thread also resolves the same tag; exactly one
            // loader instance must serve all of them.
            let ret = runtime
                .invoke_dynamic("half", vec![Value::Double(f64::from(t) * 2.0)])
                .unwrap();
            assert_eq!(ret.as_double(), Some(f64::from(t)));
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }
}
