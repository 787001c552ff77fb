use regiontrace::backend::{Backend, ChromeTraceBackend};
use regiontrace::engine::{self, Tracer, TracerOptions};
use regiontrace::registry::ModuleRegistry;
use regiontrace_common::ParamValue;
use std::sync::Arc;

#[test]
fn test_export_creates_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ChromeTraceBackend::new(dir.path(), None).unwrap());
    let tracer = Tracer::new(backend.clone(), ModuleRegistry::new(), TracerOptions::default());

    tracer.run_fn(|| {
        let f = engine::enter(Some("__main__"), "f").unwrap();
        engine::parameter("n", &ParamValue::Uint(7)).unwrap();
        f.exit().unwrap();
    });

    let mut buffer = Vec::new();
    backend.export(&mut buffer).expect("Failed to export trace");

    let parsed: serde_json::Value = serde_json::from_slice(&buffer).expect("Invalid JSON");
    assert_eq!(parsed["displayTimeUnit"], "ms");

    let events = parsed["traceEvents"].as_array().unwrap();
    let phases: Vec<&str> = events.iter().filter_map(|e| e["ph"].as_str()).collect();
    assert_eq!(phases, vec!["B", "I", "E", "M"]);
    assert_eq!(events[0]["name"], "__main__:f");
    assert_eq!(events[0]["args"]["module"], "__main__");
    assert_eq!(events[0]["args"]["unit"], "f");
    assert_eq!(events[1]["args"]["n"], 7);
}

#[test]
fn test_finalize_writes_rank_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ChromeTraceBackend::new(dir.path(), Some(2)).unwrap();
    backend.region_begin(&regiontrace::name_of(Some("m"), "f")).unwrap();
    backend.region_end(&regiontrace::name_of(Some("m"), "f")).unwrap();
    backend.finalize().unwrap();

    let content = std::fs::read_to_string(dir.path().join("traces.2.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(parsed["traceEvents"].as_array().unwrap().iter().all(|e| e["pid"] == 2));
}

#[test]
fn test_script_locations_reach_begin_events() {
    use regiontrace::domain::Namespace;
    use regiontrace::host::{Interpreter, Script};
    use std::sync::atomic::AtomicBool;

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ChromeTraceBackend::new(dir.path(), None).unwrap());
    let registry = ModuleRegistry::new();
    let tracer = Tracer::new(backend.clone(), registry.clone(), TracerOptions::default());

    let script = Script::parse(
        r#"{ "functions": { "f": { "location": { "file": "app.py", "line": 12 } } },
             "main": [{ "call": "f" }] }"#,
    )
    .unwrap();
    let stop = AtomicBool::new(false);
    let interpreter = Interpreter::new(&script, &registry, &stop);
    let mut globals = Namespace::main(std::path::Path::new("app.py"), &[]);
    let mut locals = Namespace::default();
    tracer.run_ctx(&interpreter, &mut globals, &mut locals).unwrap();

    let mut buffer = Vec::new();
    backend.export(&mut buffer).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    let begin = &parsed["traceEvents"][0];
    assert_eq!(begin["name"], "__main__:f");
    assert_eq!(begin["args"]["file"], "app.py");
    assert_eq!(begin["args"]["line"], 12);
}

#[test]
fn test_traced_macro_records_call_site() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ChromeTraceBackend::new(dir.path(), None).unwrap());
    let tracer = Tracer::new(backend.clone(), ModuleRegistry::new(), TracerOptions::default());

    let line = tracer.run_fn(|| {
        let line = line!() + 1;
        let frame = regiontrace::traced!("work").unwrap();
        frame.exit().unwrap();
        line
    });

    let mut buffer = Vec::new();
    backend.export(&mut buffer).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    let begin = &parsed["traceEvents"][0];
    assert_eq!(begin["name"], "test_chrome_trace:work");
    assert!(begin["args"]["file"].as_str().unwrap().ends_with("test_chrome_trace.rs"));
    assert_eq!(begin["args"]["line"], line);
}
