//! End-to-end tests of the healing loop on the built-in backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_bundler::SourceMap;
use forge_diagnostics::ErrorKind;
use forge_heal::{
    FixSource, ForgeConfig, HealOptions, HealResult, Healer, MockReply, MockRepairService,
    PatchOnlyRepairService, RepairRequest, RepairService,
};
use forge_retry::SchedulerConfig;

fn files(entries: &[(&str, &str)]) -> SourceMap {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_base_delay(Duration::from_millis(10))
        .with_jitter(0.0)
}

fn healer_with(repair: MockRepairService) -> Healer {
    Healer::new(Arc::new(repair)).with_scheduler_config(fast_scheduler())
}

#[tokio::test(start_paused = true)]
async fn test_undefined_component_repaired_through_service() {
    let repair = MockRepairService::new().add_reply(MockReply::replace("<Btn/>", "<button>ok</button>"));
    let healer = healer_with(repair.clone());

    let report = healer
        .heal(files(&[("App.tsx", "export default function App(){ return <Btn/> }")]))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.rounds, 1);
    assert!(report.remaining.is_empty());
    assert!(report.result.code.contains("<button>ok</button>"));
    assert_eq!(report.files["App.tsx"], "export default function App(){ return <button>ok</button> }");

    let requests = repair.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].target_file, "App.tsx");
    assert_eq!(requests[0].diagnosis.kind, ErrorKind::ImportMissing);
    assert!(requests[0].prompt.contains("Btn"));
    assert!(requests[0].prompt.contains("App.tsx:1:39"));

    let fix = &report.applied[0];
    assert_eq!(fix.source, FixSource::Repair);
    assert_eq!(fix.attempts, 1);
    assert_eq!(fix.round, 1);
}

#[tokio::test(start_paused = true)]
async fn test_known_identifier_patched_without_service() {
    let healer = Healer::new(Arc::new(PatchOnlyRepairService)).with_scheduler_config(fast_scheduler());

    let report = healer
        .heal(files(&[(
            "src/App.tsx",
            "export default function App() {\n  return <ArrowRight />;\n}\n",
        )]))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.modified, vec!["src/App.tsx".to_string()]);
    assert!(report.files["src/App.tsx"].starts_with("import { ArrowRight } from 'lucide-react';\n"));
    assert!(report.result.externals.contains(&"lucide-react".to_string()));
    assert_eq!(report.applied[0].source, FixSource::Patch);
    assert_eq!(report.stats.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_several_patches_in_one_file_compose() {
    let healer = Healer::default().with_scheduler_config(fast_scheduler());

    let report = healer
        .heal(files(&[(
            "App.tsx",
            "export default function App() {\n  return <div><ArrowRight /><Check /></div>;\n}\n",
        )]))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.applied.len(), 2);
    let app = &report.files["App.tsx"];
    assert!(app.contains("ArrowRight"));
    assert_eq!(app.matches("from 'lucide-react'").count(), 1);
    let import_line = app.lines().next().unwrap();
    assert!(import_line.contains("ArrowRight") && import_line.contains("Check"));
}

#[tokio::test(start_paused = true)]
async fn test_patch_only_leaves_prompt_fixes_alone() {
    let healer = Healer::default().with_scheduler_config(fast_scheduler());
    let input = files(&[("App.tsx", "export default function App(){ return <Btn/> }")]);

    let report = healer.heal(input.clone()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.rounds, 0);
    assert_eq!(report.files, input);
    assert!(report.modified.is_empty());
    assert_eq!(report.remaining.len(), 1);
    assert_eq!(report.remaining[0].message, "ReferenceError: Btn is not defined");
}

#[tokio::test(start_paused = true)]
async fn test_healthy_project_needs_no_rounds() {
    let repair = MockRepairService::new();
    let report = healer_with(repair.clone())
        .heal(files(&[("App.tsx", "export default function App() { return null; }")]))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.rounds, 0);
    assert!(report.applied.is_empty());
    assert_eq!(repair.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unfixable_build_errors_stop_immediately() {
    let repair = MockRepairService::new();
    let report = healer_with(repair.clone()).heal(SourceMap::new()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.rounds, 0);
    assert_eq!(report.remaining[0].kind, ErrorKind::Unknown);
    assert_eq!(repair.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_round_budget_is_respected() {
    // Every repair swaps one undefined component for another.
    let repair = MockRepairService::new()
        .add_reply(MockReply::replace("<Btn/>", "<Card/>"))
        .add_reply(MockReply::replace("<Card/>", "<Panel/>"))
        .add_reply(MockReply::replace("<Panel/>", "<Btn/>"));
    let healer = healer_with(repair.clone()).with_options(HealOptions {
        max_rounds: 2,
        auto_fixable_only: true,
    });

    let report = healer
        .heal(files(&[("App.tsx", "export default function App(){ return <Btn/> }")]))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.applied.len(), 2);
    assert_eq!(repair.call_count(), 2);
    assert_eq!(report.remaining[0].message, "ReferenceError: Panel is not defined");
}

/// Takes a while to answer, then swaps the undefined component for `<i/>`.
#[derive(Default)]
struct SlowRepairService {
    calls: AtomicUsize,
}

#[async_trait]
impl RepairService for SlowRepairService {
    fn name(&self) -> &str {
        "slow"
    }

    async fn repair(&self, request: RepairRequest) -> HealResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let name = request
            .diagnosis
            .message
            .trim_start_matches("ReferenceError: ")
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(request.current_content.replace(&format!("<{name}/>"), "<i/>"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_repairs_of_one_file_keep_both_edits() {
    let repair = Arc::new(SlowRepairService::default());
    let healer = Healer::new(repair.clone())
        .with_scheduler_config(fast_scheduler().with_concurrency(2));

    let report = healer
        .heal(files(&[(
            "App.tsx",
            "export default function App(){ return <div><Btn/><Card/></div> }",
        )]))
        .await
        .unwrap();

    assert!(report.success, "remaining: {:?}", report.remaining);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.applied.len(), 2);
    assert_eq!(repair.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        report.files["App.tsx"],
        "export default function App(){ return <div><i/><i/></div> }"
    );
}

#[tokio::test(start_paused = true)]
async fn test_failing_service_retries_with_backoff() {
    let repair = MockRepairService::new()
        .add_file_reply("App.tsx", MockReply::fail("model overloaded"))
        .add_file_reply("App.tsx", MockReply::replace("<Btn/>", "null"));
    let healer = healer_with(repair.clone());

    let started = tokio::time::Instant::now();
    let report = healer
        .heal(files(&[("App.tsx", "export default function App(){ return <Btn/> }")]))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(repair.call_count(), 2);
    assert_eq!(report.applied[0].attempts, 2);
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[tokio::test]
async fn test_runtime_error_from_preview_channel() {
    let healer = Healer::default();
    let sources = files(&[(
        "src/App.tsx",
        "export default function App() {\n  const [n, setN] = useState(0);\n  return null;\n}\n",
    )]);
    let json = r#"{"type":"preview-error","error":{"message":"useState is not defined","stack":"ReferenceError: useState is not defined\n    at App (http://localhost:5173/src/App.tsx:2:21)"}}"#;

    let runtime = healer.handle_runtime_error(json, &sources).unwrap();

    assert_eq!(runtime.diagnosis.kind, ErrorKind::ImportMissing);
    assert_eq!(runtime.diagnosis.line, Some(2));
    assert!(runtime.auto_fixable);
    assert_eq!(runtime.target_file.as_deref(), Some("src/App.tsx"));
    assert!(runtime.fix.is_direct_patch());
    assert!(runtime
        .fix
        .fixed_code
        .unwrap()
        .starts_with("import { useState } from 'react';\n"));
}

#[tokio::test]
async fn test_runtime_messages_on_other_channels_are_ignored() {
    let config = ForgeConfig::parse(
        "[bundler]\nerror_channel = \"app-crash\"\n",
        forge_heal::ConfigFormat::Toml,
    )
    .unwrap();
    let healer = Healer::from_config(&config, Arc::new(PatchOnlyRepairService)).unwrap();
    let sources = SourceMap::new();

    let default_channel = r#"{"type":"preview-error","error":{"message":"boom"}}"#;
    assert!(healer.handle_runtime_error(default_channel, &sources).is_none());
    assert!(healer.handle_runtime_error("{not json", &sources).is_none());

    let custom = r#"{"type":"app-crash","error":{"message":"Maximum call stack size exceeded"}}"#;
    let runtime = healer.handle_runtime_error(custom, &sources).unwrap();
    assert_eq!(runtime.diagnosis.kind, ErrorKind::Runtime);
    assert!(!runtime.auto_fixable);
    assert_eq!(runtime.target_file, None);
}
