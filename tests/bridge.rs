use std::io::Write;

use wrun::{
    Engine, HostError, Instance, InvocationBridge, Module, ModuleLoader, ModuleSource, ReportSink,
    Val,
};

const ADD: &str = r#"
    (module
        (func (export "add") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add
        )
    )
"#;

/// Sink capturing every published line.
#[derive(Default)]
struct VecSink {
    lines: Vec<String>,
}

impl ReportSink for VecSink {
    fn publish(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

fn add_bridge() -> InvocationBridge {
    let engine = Engine::default();
    let module = Module::new(&engine, ADD).unwrap();
    InvocationBridge::new(Instance::new(&module).unwrap())
}

#[test]
fn invoke_wraps_result_with_provenance() {
    let mut bridge = add_bridge();
    let result = bridge.invoke("add", &[Val::I32(24), Val::I32(24)]).unwrap();
    assert_eq!(result.export, "add");
    assert_eq!(result.args, vec![Val::I32(24), Val::I32(24)]);
    assert_eq!(result.values, vec![Val::I32(48)]);
    assert_eq!(result.report(), "Hello World! addResult: 48");
}

#[test]
fn unknown_export_is_an_error_not_a_default() {
    let mut bridge = add_bridge();
    match bridge.invoke("sub", &[Val::I32(1), Val::I32(2)]) {
        Err(HostError::ExportNotFound(name)) => assert_eq!(name, "sub"),
        other => panic!("expected ExportNotFound, got {other:?}"),
    }
}

#[test]
fn wrong_arity_is_rejected_before_dispatch() {
    let mut bridge = add_bridge();
    match bridge.invoke("add", &[Val::I32(1)]) {
        Err(HostError::ArgumentMismatch(msg)) => {
            assert!(msg.contains("i32, i32"), "unexpected message: {msg}");
        }
        other => panic!("expected ArgumentMismatch, got {other:?}"),
    }
}

#[test]
fn wrong_argument_type_is_rejected_before_dispatch() {
    let mut bridge = add_bridge();
    match bridge.invoke("add", &[Val::I32(1), Val::I64(2)]) {
        Err(HostError::ArgumentMismatch(..)) => {}
        other => panic!("expected ArgumentMismatch, got {other:?}"),
    }
}

#[test]
fn run_report_publishes_exactly_one_line() {
    let mut bridge = add_bridge();
    let mut sink = VecSink::default();
    bridge
        .run_report(&mut sink, "add", &[Val::I32(24), Val::I32(24)])
        .unwrap();
    assert_eq!(sink.lines, vec!["Hello World! addResult: 48".to_string()]);
}

#[test]
fn failed_invocation_leaves_the_sink_empty() {
    let mut bridge = add_bridge();
    let mut sink = VecSink::default();
    let result = bridge.run_report(&mut sink, "missing", &[]);
    assert!(result.is_err());
    assert!(sink.lines.is_empty());
}

#[test]
fn end_to_end_load_invoke_report() {
    let wasm = wat::parse_str(ADD).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&wasm).unwrap();

    let loader = ModuleLoader::default();
    let source = ModuleSource::parse(&file.path().display().to_string());
    assert!(matches!(source, ModuleSource::Path(..)));

    let instance = loader.load(&source).unwrap();
    let mut bridge = InvocationBridge::new(instance);
    let mut sink = VecSink::default();
    bridge
        .run_report(&mut sink, "add", &[Val::I32(24), Val::I32(24)])
        .unwrap();
    assert_eq!(sink.lines, vec!["Hello World! addResult: 48".to_string()]);
}

#[test]
fn missing_source_fails_with_load_error() {
    let loader = ModuleLoader::default();
    let source = ModuleSource::parse("/nonexistent/module.wasm");
    match loader.load(&source) {
        Err(HostError::Load { location, .. }) => {
            assert_eq!(location, "/nonexistent/module.wasm");
        }
        other => panic!("expected Load error, got {:?}", other.map(|_| "handle")),
    }
}

#[test]
fn invalid_bytes_fail_with_instantiation_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not wasm").unwrap();

    let loader = ModuleLoader::default();
    let source = ModuleSource::parse(&file.path().display().to_string());
    match loader.load(&source) {
        Err(HostError::Instantiation(..)) => {}
        other => panic!(
            "expected Instantiation error, got {:?}",
            other.map(|_| "handle")
        ),
    }
}

#[test]
fn imports_make_a_module_uninstantiable() {
    let engine = Engine::default();
    let result = Module::new(
        &engine,
        r#"
        (module
            (import "env" "host_add" (func (param i32 i32) (result i32)))
        )
    "#,
    );
    match result {
        Err(HostError::Instantiation(msg)) => {
            assert!(msg.contains("env::host_add"), "unexpected message: {msg}");
        }
        other => panic!(
            "expected Instantiation error, got {:?}",
            other.map(|_| "module")
        ),
    }
}

#[test]
fn url_sources_are_classified_as_urls() {
    let source = ModuleSource::parse("https://example.com/mod.wasm");
    assert_eq!(
        source,
        ModuleSource::Url("https://example.com/mod.wasm".into())
    );
    assert_eq!(source.location(), "https://example.com/mod.wasm");
}
