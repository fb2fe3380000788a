//! The self-healing preview loop.
//!
//! Each round bundles the current sources, classifies the build errors,
//! keeps the diagnoses worth acting on and schedules one repair task per
//! diagnosis on a fresh [`RetryScheduler`]. A task patches (or asks the
//! repair service to rewrite) its target file, re-bundles, and succeeds
//! once its diagnosis is no longer reported. The next round starts when the
//! scheduler drains.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use forge_bundler::path::strip_prefix;
use forge_bundler::{BundleResult, Bundler, PreviewMessage, SourceMap};
use forge_diagnostics::{apply_strategy, is_auto_fixable, ClassifiedError, ErrorClassifier, ErrorKind, FixResult};
use forge_retry::{QueueStats, RetryScheduler, SchedulerConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ForgeConfig, HealOptions};
use crate::error::HealResult;
use crate::repair::{PatchOnlyRepairService, RepairRequest, RepairService};

/// How a fix was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixSource {
    /// A deterministic patch from the fix strategy.
    Patch,
    /// Content returned by the repair service.
    Repair,
}

/// A fix that made its diagnosis disappear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFix {
    pub round: u32,
    pub kind: ErrorKind,
    pub message: String,
    pub target_file: String,
    pub description: String,
    pub source: FixSource,
    /// Attempts the task needed.
    pub attempts: u32,
}

/// Outcome of [`Healer::heal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealReport {
    pub success: bool,
    /// Repair rounds run. Zero when the first bundle already succeeded.
    pub rounds: u32,
    /// Bundle of the final sources.
    pub result: BundleResult,
    pub applied: Vec<AppliedFix>,
    /// Diagnoses still reported by the final bundle.
    pub remaining: Vec<ClassifiedError>,
    /// Final sources, keyed as given.
    pub files: SourceMap,
    /// Keys whose content differs from the input.
    pub modified: Vec<String>,
    /// Task counts summed over all rounds.
    pub stats: QueueStats,
}

/// A classified runtime error with the fix its strategy proposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDiagnosis {
    pub diagnosis: ClassifiedError,
    pub auto_fixable: bool,
    /// Key of the file the fix applies to, if it is in the source map.
    pub target_file: Option<String>,
    pub fix: FixResult,
}

/// Find the key of `file` in `files`, comparing normalized paths.
fn find_key(files: &SourceMap, file: &str) -> Option<String> {
    if files.contains_key(file) {
        return Some(file.to_string());
    }
    let wanted = strip_prefix(file);
    files.keys().find(|key| strip_prefix(key) == wanted).cloned()
}

fn same_diagnosis(a: &ClassifiedError, b: &ClassifiedError) -> bool {
    a.kind == b.kind
        && a.message == b.message
        && a.file.as_deref().map(strip_prefix) == b.file.as_deref().map(strip_prefix)
}

/// State shared by the tasks of one heal run.
struct Workspace {
    bundler: Arc<Bundler>,
    classifier: Arc<ErrorClassifier>,
    repair: Arc<dyn RepairService>,
    files: Mutex<SourceMap>,
    applied: Mutex<Vec<AppliedFix>>,
    /// Serializes read-fix-write cycles on the same file.
    file_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Workspace {
    fn new(
        bundler: Arc<Bundler>,
        classifier: Arc<ErrorClassifier>,
        repair: Arc<dyn RepairService>,
        files: SourceMap,
    ) -> Self {
        Self {
            bundler,
            classifier,
            repair,
            files: Mutex::new(files),
            applied: Mutex::new(Vec::new()),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    fn file_lock(&self, target: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.file_locks
            .lock()
            .entry(target.to_string())
            .or_default()
            .clone()
    }

    fn snapshot(&self) -> SourceMap {
        self.files.lock().clone()
    }

    fn still_reported(&self, result: &BundleResult, diagnosis: &ClassifiedError) -> bool {
        self.classifier
            .classify_many(&result.raw_errors())
            .iter()
            .any(|reported| same_diagnosis(reported, diagnosis))
    }

    async fn attempt(
        &self,
        round: u32,
        diagnosis: &ClassifiedError,
        target: &str,
        attempts: &AtomicU32,
    ) -> anyhow::Result<bool> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let lock = self.file_lock(target);
        let guard = lock.lock().await;
        let current = self.files.lock().get(target).cloned().unwrap_or_default();
        let fix = apply_strategy(diagnosis, &current);

        let (content, source) = match (fix.fixed_code, fix.ai_prompt) {
            (Some(code), _) => (code, FixSource::Patch),
            (None, Some(prompt)) if self.repair.handles_prompts() => {
                let request = RepairRequest {
                    prompt,
                    target_file: target.to_string(),
                    current_content: current.clone(),
                    diagnosis: diagnosis.clone(),
                };
                (self.repair.repair(request).await?, FixSource::Repair)
            }
            _ => {
                debug!("No applicable fix for {} in {}", diagnosis.kind, target);
                return Ok(false);
            }
        };

        if content != current {
            self.files.lock().insert(target.to_string(), content);
        }
        drop(guard);

        let result = self.bundler.bundle(&self.snapshot()).await;
        if self.still_reported(&result, diagnosis) {
            debug!(attempt, "{} still reported after fix of {}", diagnosis.kind, target);
            return Ok(false);
        }

        info!("Resolved {} in {} ({})", diagnosis.kind, target, fix.description);
        self.applied.lock().push(AppliedFix {
            round,
            kind: diagnosis.kind,
            message: diagnosis.message.clone(),
            target_file: target.to_string(),
            description: fix.description,
            source,
            attempts: attempt,
        });
        Ok(true)
    }
}

/// Drives bundle → classify → fix rounds until the preview builds.
pub struct Healer {
    bundler: Arc<Bundler>,
    classifier: Arc<ErrorClassifier>,
    repair: Arc<dyn RepairService>,
    scheduler: SchedulerConfig,
    options: HealOptions,
}

impl Default for Healer {
    fn default() -> Self {
        Self::new(Arc::new(PatchOnlyRepairService))
    }
}

impl Healer {
    pub fn new(repair: Arc<dyn RepairService>) -> Self {
        Self {
            bundler: Arc::new(Bundler::new()),
            classifier: Arc::new(ErrorClassifier::new()),
            repair,
            scheduler: SchedulerConfig::default(),
            options: HealOptions::default(),
        }
    }

    /// Healer configured from a loaded [`ForgeConfig`].
    pub fn from_config(config: &ForgeConfig, repair: Arc<dyn RepairService>) -> HealResult<Self> {
        config.validate()?;
        Ok(Self {
            bundler: Arc::new(Bundler::new().with_options(config.bundler.clone())),
            scheduler: config.scheduler.clone(),
            options: config.heal.clone(),
            ..Self::new(repair)
        })
    }

    pub fn with_bundler(mut self, bundler: Bundler) -> Self {
        self.bundler = Arc::new(bundler);
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn with_options(mut self, options: HealOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bundler(&self) -> &Bundler {
        &self.bundler
    }

    pub fn options(&self) -> &HealOptions {
        &self.options
    }

    /// Diagnoses of `result` the loop will act on.
    fn actionable(&self, result: &BundleResult) -> Vec<ClassifiedError> {
        self.classifier
            .classify_many(&result.raw_errors())
            .into_iter()
            .filter(|d| !self.options.auto_fixable_only || is_auto_fixable(d))
            .collect()
    }

    /// Key a diagnosis should be repaired in: its own file when present,
    /// otherwise the entry module.
    fn target_for(files: &SourceMap, diagnosis: &ClassifiedError, result: &BundleResult) -> Option<String> {
        diagnosis
            .file
            .as_deref()
            .and_then(|file| find_key(files, file))
            .or_else(|| {
                result
                    .entry_point
                    .as_ref()
                    .and_then(|entry| find_key(files, &entry.file))
            })
    }

    /// Repair `files` until they bundle, or until the round budget runs out.
    pub async fn heal(&self, files: SourceMap) -> HealResult<HealReport> {
        let original = files.clone();
        let workspace = Arc::new(Workspace::new(
            self.bundler.clone(),
            self.classifier.clone(),
            self.repair.clone(),
            files,
        ));

        let mut stats = QueueStats::default();
        let mut rounds = 0;
        let mut result = self.bundler.bundle(&workspace.snapshot()).await;

        while !result.success && rounds < self.options.max_rounds {
            let diagnoses = self.actionable(&result);
            if diagnoses.is_empty() {
                info!("No actionable diagnoses; stopping");
                break;
            }

            let round = rounds + 1;
            let scheduler = RetryScheduler::new(self.scheduler.clone())?;
            let snapshot = workspace.snapshot();
            let mut enqueued = 0;

            for diagnosis in diagnoses {
                let Some(target) = Self::target_for(&snapshot, &diagnosis, &result) else {
                    warn!("No file to repair for {}: {}", diagnosis.kind, diagnosis.message);
                    continue;
                };
                let planned = apply_strategy(&diagnosis, &snapshot[&target]);
                if !planned.success {
                    debug!("{} strategy cannot interpret: {}", diagnosis.kind, planned.description);
                    continue;
                }
                if !planned.is_direct_patch() && !self.repair.handles_prompts() {
                    debug!("Skipping prompt-only fix for {} ({} declines prompts)", target, self.repair.name());
                    continue;
                }

                let workspace = workspace.clone();
                let task_diagnosis = diagnosis.clone();
                let attempts = Arc::new(AtomicU32::new(0));
                scheduler.enqueue(diagnosis, move || {
                    let workspace = workspace.clone();
                    let diagnosis = task_diagnosis.clone();
                    let target = target.clone();
                    let attempts = attempts.clone();
                    async move { workspace.attempt(round, &diagnosis, &target, &attempts).await }
                });
                enqueued += 1;
            }

            if enqueued == 0 {
                info!("Round {}: nothing the repair service can act on", round);
                break;
            }
            rounds = round;

            info!("Round {}: {} repair task(s) scheduled", round, enqueued);
            scheduler.wait_idle().await;

            let round_stats = scheduler.get_stats();
            stats.total += round_stats.total;
            stats.succeeded += round_stats.succeeded;
            stats.failed += round_stats.failed;
            stats.cancelled += round_stats.cancelled;

            result = self.bundler.bundle(&workspace.snapshot()).await;
        }

        let files = workspace.snapshot();
        let modified = files
            .iter()
            .filter(|(key, content)| original.get(*key) != Some(*content))
            .map(|(key, _)| key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let remaining = if result.success {
            Vec::new()
        } else {
            self.classifier.classify_many(&result.raw_errors())
        };
        let applied = workspace.applied.lock().clone();

        if result.success {
            info!("Preview builds after {} round(s), {} fix(es)", rounds, applied.len());
        } else {
            warn!("Healing stopped after {} round(s) with {} diagnosis(es) left", rounds, remaining.len());
        }

        Ok(HealReport {
            success: result.success,
            rounds,
            result,
            applied,
            remaining,
            files,
            modified,
            stats,
        })
    }

    /// Classify a message posted by the preview surface and propose a fix.
    ///
    /// Returns `None` for malformed messages and other channels.
    pub fn handle_runtime_error(&self, json: &str, files: &SourceMap) -> Option<RuntimeDiagnosis> {
        let message = PreviewMessage::parse(json, &self.bundler.options().error_channel)?;
        let diagnosis = self.classifier.classify(&message.error.to_raw());
        let target_file = diagnosis.file.as_deref().and_then(|file| find_key(files, file));
        let source = target_file
            .as_ref()
            .and_then(|key| files.get(key))
            .map(String::as_str)
            .unwrap_or("");
        let fix = apply_strategy(&diagnosis, source);
        info!("Runtime {} reported: {}", diagnosis.kind, diagnosis.message);

        Some(RuntimeDiagnosis {
            auto_fixable: is_auto_fixable(&diagnosis),
            diagnosis,
            target_file,
            fix,
        })
    }
}
