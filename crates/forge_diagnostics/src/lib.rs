//! previewforge Diagnostics
//!
//! Turns raw compiler and runtime error text into typed diagnoses and
//! decides how each diagnosis should be repaired.

pub mod classifier;
pub mod identifiers;
pub mod kind;
pub mod strategy;

pub use classifier::{
    classify, classify_many, extract_location, is_auto_fixable, ClassifiedError, ErrorClassifier,
    ErrorPattern, AUTO_FIXABLE_KINDS, AUTO_FIX_THRESHOLD, FALLBACK_CONFIDENCE,
};
pub use identifiers::{lookup, ImportStyle, KnownIdentifier, KNOWN_IDENTIFIERS};
pub use kind::{label, ErrorKind};
pub use strategy::{add_import, apply_strategy, FixResult};
