use serde_json::json;
use stencil_codegen::{
    OperationDescriptor, OperationEngine, OperationStatus, PathResolver, validate_operation,
};
use tempfile::TempDir;

fn descriptor(value: serde_json::Value) -> OperationDescriptor {
    serde_json::from_value(value).unwrap()
}

#[test]
fn resolve_validate_apply_from_json() {
    let workspace = TempDir::new().unwrap();
    let context = json!({ "name": "button", "dir": workspace.path().display().to_string() });

    let desc = descriptor(json!({ "to": "{{ dir }}//components/./{{ name }}.tsx" }));
    assert!(validate_operation(&desc).valid);

    let path = <PathResolver>::default().resolve(&desc.to, &context).unwrap();
    let result = OperationEngine::new()
        .apply(&path, "export const Button = () => null;\n", &desc, &context)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Applied);
    let written = workspace.path().join("components/./button.tsx");
    assert_eq!(
        std::fs::read_to_string(written).unwrap(),
        "export const Button = () => null;\n"
    );
}

#[test]
fn second_identical_inject_is_noop() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("index.ts");
    std::fs::write(&target, "// exports\nexport * from './a';\n").unwrap();

    let desc = descriptor(json!({
        "to": "index.ts",
        "inject": true,
        "after": "// exports"
    }));
    let engine = OperationEngine::new();
    let content = "export * from './button';\n";

    let first = engine.apply(&target, content, &desc, &json!({})).unwrap();
    assert!(first.changed);
    let size_after_first = std::fs::metadata(&target).unwrap().len();

    let second = engine.apply(&target, content, &desc, &json!({})).unwrap();
    assert!(!second.changed);
    assert_eq!(second.status, OperationStatus::NoOpIdempotent);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), size_after_first);
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "// exports\nexport * from './button';\nexport * from './a';\n"
    );
}

#[test]
fn identical_write_twice_leaves_bytes_identical() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("out.json");
    let desc = descriptor(json!({ "to": "out.json" }));
    let engine = OperationEngine::new();

    engine.apply(&target, "{\"a\":1}\n", &desc, &json!({})).unwrap();
    let first = std::fs::read(&target).unwrap();
    let result = engine.apply(&target, "{\"a\":1}\n", &desc, &json!({})).unwrap();
    assert!(!result.changed);
    assert_eq!(std::fs::read(&target).unwrap(), first);
}

#[test]
fn inject_and_append_conflict_is_rejected() {
    let report = validate_operation(&descriptor(json!({
        "to": "x",
        "inject": true,
        "append": true
    })));
    assert!(!report.valid);
    assert!(report.errors[0].contains("inject"));
    assert!(report.errors[0].contains("append"));
}

#[test]
fn line_at_repeats_shift_content() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("list.txt");
    std::fs::write(&target, "a\nb\n").unwrap();
    let desc = descriptor(json!({ "to": "list.txt", "lineAt": 2 }));
    let engine = OperationEngine::new();

    engine.apply(&target, "x", &desc, &json!({})).unwrap();
    let again = engine.apply(&target, "x", &desc, &json!({})).unwrap();
    assert!(again.changed);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "a\nx\nx\nb\n");
}

#[test]
fn concurrent_injects_apply_once() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("shared.ts");
    std::fs::write(&target, "// here\n").unwrap();
    let desc = descriptor(json!({ "to": "shared.ts", "inject": true, "after": "// here" }));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let target = target.clone();
            let desc = desc.clone();
            std::thread::spawn(move || {
                OperationEngine::new()
                    .apply(&target, "import x;\n", &desc, &json!({}))
                    .unwrap()
                    .changed
            })
        })
        .collect();
    let changed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|c| *c)
        .count();

    assert_eq!(changed, 1);
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "// here\nimport x;\n"
    );
}

#[test]
fn multi_line_inject_into_crlf_file_applies_once() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("routes.ts");
    std::fs::write(&target, "a\r\n// here\r\nb\r\n").unwrap();

    let desc = descriptor(json!({ "to": "routes.ts", "inject": true, "after": "// here" }));
    let engine = OperationEngine::new();

    let first = engine.apply(&target, "x\ny\n", &desc, &json!({})).unwrap();
    assert!(first.changed);
    let second = engine.apply(&target, "x\ny\n", &desc, &json!({})).unwrap();
    assert_eq!(second.status, OperationStatus::NoOpIdempotent);
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "a\r\n// here\r\nx\r\ny\r\nb\r\n"
    );
}

#[test]
fn markers_without_inject_are_ignored() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("log.txt");
    std::fs::write(&target, "first\n").unwrap();

    let desc = descriptor(json!({
        "to": "log.txt",
        "append": true,
        "before": "a",
        "after": "b"
    }));
    let report = validate_operation(&desc);
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 1);

    let result = OperationEngine::new()
        .apply(&target, "second\n", &desc, &json!({}))
        .unwrap();
    assert_eq!(result.status, OperationStatus::Applied);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "first\nsecond\n");
}

#[test]
fn write_replaces_binary_target() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("logo.bin");
    std::fs::write(&target, [0xff, 0xfe, 0x00]).unwrap();

    let engine = OperationEngine::new();
    let desc = OperationDescriptor::write("logo.bin");
    let result = engine.apply(&target, "text", &desc, &json!({})).unwrap();
    assert_eq!(result.status, OperationStatus::Applied);
    assert_eq!(std::fs::read(&target).unwrap(), b"text");

    let again = engine.apply(&target, "text", &desc, &json!({})).unwrap();
    assert_eq!(again.status, OperationStatus::NoOpIdempotent);
}

#[test]
fn append_to_binary_target_is_an_error() {
    let workspace = TempDir::new().unwrap();
    let target = workspace.path().join("logo.bin");
    std::fs::write(&target, [0xff, 0xfe, 0x00]).unwrap();

    let desc = descriptor(json!({ "to": "logo.bin", "append": true }));
    assert!(OperationEngine::new().apply(&target, "text", &desc, &json!({})).is_err());
    assert_eq!(std::fs::read(&target).unwrap(), [0xff, 0xfe, 0x00]);
}
