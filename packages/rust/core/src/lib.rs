//! Pipeline stages for litscreen.
//!
//! Each stage loads a Record Store (resuming from its checkpoint when one
//! exists), does its work through a [`ClassificationService`], and writes
//! an observational report at the end.
//!
//! [`ClassificationService`]: litscreen_classifier::ClassificationService

pub mod analysis;
pub mod formatting;
pub mod progress;
pub mod resume;
pub mod screening;

pub use analysis::{AnalysisOptions, AnalysisSummary, run_analysis};
pub use formatting::{FormattingSummary, run_formatting};
pub use progress::{SilentProgress, StageProgress};
pub use resume::Origin;
pub use screening::{ScreeningOptions, ScreeningSummary, run_screening};
