//! Integration tests for classification and fix dispatch.

use forge_diagnostics::{
    apply_strategy, classify, classify_many, is_auto_fixable, ClassifiedError, ErrorKind,
};

#[test]
fn test_every_kind_dispatches_with_target_file() {
    let raws = [
        "ReferenceError: Btn is not defined\n    at App (App.tsx:1:39)",
        "React Hook \"useState\" is called conditionally.\n    at App (App.tsx:3:5)",
        "TypeError: Cannot read properties of null (reading 'id')\n    at Card (components/Card.tsx:8:20)",
        "Unterminated string literal\n    at lib/data.ts:2:14",
        "RangeError: Maximum call stack size exceeded\n    at Loop (Loop.tsx:4:3)",
        "Warning: Invalid DOM property `for`. Did you mean `htmlFor`?\n    at label (Form.tsx:9:7)",
        "it broke\n    at Weird.tsx:1:1",
    ];

    for raw in raws {
        let error = classify(raw);
        let result = apply_strategy(&error, "");
        assert_eq!(result.strategy, error.kind);
        assert_eq!(result.target_file, error.file, "for {raw:?}");
        assert!(result.target_file.is_some());
        if result.success {
            assert!(result.fixed_code.is_some() || result.ai_prompt.is_some());
        }
    }
}

#[test]
fn test_build_error_pipeline() {
    // The shape produced by a failed bundle's raw error rendering.
    let raw = "ReferenceError: Btn is not defined\n    at App.tsx:1:39";
    let error = classify(raw);

    assert_eq!(error.kind, ErrorKind::ImportMissing);
    assert!(is_auto_fixable(&error));

    let result = apply_strategy(&error, "export default function App(){ return <Btn/> }");
    assert!(result.success);
    assert!(result.fixed_code.is_none());
    assert!(result.ai_prompt.is_some());
}

#[test]
fn test_classified_error_json_shape() {
    let error = classify("TypeError: x is not a function\n    at App (App.tsx:2:3)");
    let value = serde_json::to_value(&error).unwrap();
    assert_eq!(value["type"], "type-error");
    assert_eq!(value["file"], "App.tsx");
    assert_eq!(value["line"], 2);

    let back: ClassifiedError = serde_json::from_value(value).unwrap();
    assert_eq!(back.kind, ErrorKind::TypeError);
}

#[test]
fn test_classify_many_on_mixed_batch() {
    let batch = vec![
        "weird thing".to_string(),
        "Invalid hook call. Hooks can only be called inside of the body of a function component.".to_string(),
        "Cannot find module './utils'".to_string(),
        "Cannot find module './utils'".to_string(),
    ];
    let classified = classify_many(&batch);

    assert_eq!(classified.len(), 3);
    assert_eq!(classified[0].kind, ErrorKind::ImportMissing);
    assert_eq!(classified[1].kind, ErrorKind::LifecycleViolation);
    assert_eq!(classified[2].kind, ErrorKind::Unknown);
}
