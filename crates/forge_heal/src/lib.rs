//! previewforge Heal
//!
//! Closes the loop between the bundler, the diagnostics and the retry
//! scheduler: a broken preview is bundled, its errors classified and
//! repaired, and the result re-bundled until it builds.
//!
//! Prompt-only fixes go through a [`RepairService`], the boundary to
//! whatever rewrites code (usually a language model).

pub mod config;
pub mod error;
pub mod healer;
pub mod mock;
pub mod repair;

pub use config::{ConfigFormat, ForgeConfig, HealOptions, CONFIG_FILE};
pub use error::{HealError, HealResult};
pub use healer::{AppliedFix, FixSource, HealReport, Healer, RuntimeDiagnosis};
pub use mock::{MockReply, MockRepairService};
pub use repair::{PatchOnlyRepairService, RepairRequest, RepairService};
