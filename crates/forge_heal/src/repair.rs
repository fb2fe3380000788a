//! The repair collaborator boundary.
//!
//! Fix strategies that cannot patch a file themselves produce a prompt.
//! A [`RepairService`] turns that prompt into replacement file content,
//! typically by asking a language model.

use async_trait::async_trait;
use forge_diagnostics::ClassifiedError;
use serde::{Deserialize, Serialize};

use crate::error::{HealError, HealResult};

/// Everything a collaborator needs to rewrite one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub prompt: String,
    pub target_file: String,
    pub current_content: String,
    pub diagnosis: ClassifiedError,
}

/// Produces corrected file content for a repair prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepairService: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this service answers prompts at all.
    ///
    /// The healer skips prompt-only fixes when this is false.
    fn handles_prompts(&self) -> bool {
        true
    }

    /// Return the complete new content of `request.target_file`.
    async fn repair(&self, request: RepairRequest) -> HealResult<String>;
}

/// Applies direct patches only; declines every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOnlyRepairService;

#[async_trait]
impl RepairService for PatchOnlyRepairService {
    fn name(&self) -> &str {
        "patch-only"
    }

    fn handles_prompts(&self) -> bool {
        false
    }

    async fn repair(&self, request: RepairRequest) -> HealResult<String> {
        Err(HealError::RepairDeclined(format!(
            "{} cannot answer prompts for {}",
            self.name(),
            request.target_file
        )))
    }
}
