pub mod artifact;
pub mod config;
pub mod error;
pub mod logging;
pub mod region;
pub mod runtime;
pub mod schema;
pub mod table;
pub mod validation;

pub use artifact::{
    ArtifactKind, ArtifactLayout, ArtifactPath, ArtifactResolver, InterventionIndex,
    StoredArtifact, INTERVENTION_MARKER,
};
pub use config::{HarnessConfig, RunnerConfig, OUTPUT_DIR_ENV};
pub use error::{Error, Result};
pub use region::{AggregationLevel, CountyRecord, RegionId, RegionInfo, RegionRegistry, StateRecord};
pub use runtime::{ProjectionModel, RegionExecution, RunOrchestrator, RunReport, Runner};
pub use schema::{OutputSchema, CAN_MODEL_OUTPUT_SCHEMA, RT_INDICATOR, RT_INDICATOR_CI90};
pub use table::OutputTable;
pub use validation::{
    check_rt_column, Diagnostic, RtBounds, SanityReport, ValidationCase, ValidationContext,
    ValidationHarness, ValidationOutcome,
};
