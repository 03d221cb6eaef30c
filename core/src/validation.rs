use crate::artifact::{ArtifactKind, ArtifactResolver, InterventionIndex};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::logging;
use crate::region::RegionId;
use crate::runtime::{RunOrchestrator, RunReport};
use crate::schema::OutputSchema;
use crate::table::OutputTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// A non-fatal finding raised while producing or reading artifacts. Strict
/// mode turns any of these into [`Error::StrictModeViolation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub location: Option<String>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationContext {
    stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: String) {
        self.stack.push(label);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    fn location(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join(" > "))
        }
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let diag = Diagnostic {
            location: self.location(),
            message: message.into(),
        };
        self.diagnostics.push(diag);
    }

    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Exclusive bounds for the reproduction-number column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtBounds {
    pub lower_exclusive: f64,
    pub upper_exclusive: f64,
}

impl Default for RtBounds {
    fn default() -> Self {
        Self {
            lower_exclusive: 0.0,
            upper_exclusive: 6.0,
        }
    }
}

/// Outcome of the two independent Rt sanity properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityReport {
    pub indicator: String,
    pub column: usize,
    pub values: usize,
    pub non_null: usize,
    pub any_above_lower: bool,
    pub all_below_upper: bool,
    pub max: Option<f64>,
    pub bounds: RtBounds,
}

impl SanityReport {
    pub fn passed(&self) -> bool {
        self.any_above_lower && self.all_below_upper
    }

    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if !self.any_above_lower {
            failures.push(format!(
                "no value is greater than {} ({} of {} non-null)",
                self.bounds.lower_exclusive, self.non_null, self.values
            ));
        }
        if !self.all_below_upper {
            failures.push(format!(
                "non-null values reach {} (max {:?})",
                self.bounds.upper_exclusive, self.max
            ));
        }
        failures
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(Error::StatisticalSanityViolation {
                indicator: self.indicator.clone(),
                failures: self.failures(),
            })
        }
    }
}

/// Evaluates both properties on a coerced column. Missing values never
/// satisfy the existence property and are skipped by the upper bound, so an
/// all-missing column holds "< upper" vacuously while failing "> lower".
pub fn check_rt_column(
    values: &[Option<f64>],
    bounds: RtBounds,
    indicator: &str,
    column: usize,
) -> SanityReport {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let any_above_lower = present.iter().any(|value| *value > bounds.lower_exclusive);
    let all_below_upper = present.iter().all(|value| *value < bounds.upper_exclusive);
    let max = present.iter().copied().reduce(f64::max);

    SanityReport {
        indicator: indicator.to_string(),
        column,
        values: values.len(),
        non_null: present.len(),
        any_above_lower,
        all_below_upper,
        max,
        bounds,
    }
}

/// One end-to-end regression scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCase {
    pub states: Vec<String>,
    pub region: RegionId,
    pub kind: ArtifactKind,
    pub intervention: InterventionIndex,
    #[serde(default)]
    pub generate_reports: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub run: RunReport,
    pub artifact: PathBuf,
    pub rows: usize,
    pub sanity: SanityReport,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidationHarness<'a> {
    config: HarnessConfig,
    resolver: &'a ArtifactResolver,
    schema: &'a OutputSchema,
}

impl<'a> ValidationHarness<'a> {
    pub fn new(config: HarnessConfig, resolver: &'a ArtifactResolver, schema: &'a OutputSchema) -> Self {
        Self {
            config,
            resolver,
            schema,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs the case with the configured log filter installed for the
    /// duration of the call only.
    pub fn run(&self, orchestrator: &dyn RunOrchestrator, case: &ValidationCase) -> Result<ValidationOutcome> {
        match &self.config.log_filter {
            Some(filter) => {
                let subscriber = logging::subscriber(filter)?;
                tracing::subscriber::with_default(subscriber, || self.execute(orchestrator, case))
            }
            None => self.execute(orchestrator, case),
        }
    }

    fn execute(&self, orchestrator: &dyn RunOrchestrator, case: &ValidationCase) -> Result<ValidationOutcome> {
        info!(states = ?case.states, region = %case.region, "starting validation run");
        let states: Vec<&str> = case.states.iter().map(String::as_str).collect();
        let run = orchestrator.build_all_for_states(&states, case.generate_reports)?;
        self.enforce(&run.diagnostics)?;

        let artifact = self
            .resolver
            .resolve(&case.region, case.kind)?
            .for_intervention(case.intervention);
        if !artifact.exists() {
            return Err(Error::MissingArtifact(artifact));
        }

        let mut ctx = ValidationContext::new();
        let table = OutputTable::load(&artifact, self.schema, &mut ctx)?;
        let column = self.schema.index_of(self.schema.rt_indicator())?;
        ctx.push(artifact.display().to_string());
        let values = table.float_column(column, &mut ctx)?;
        ctx.pop();

        let diagnostics = ctx.finish();
        self.enforce(&diagnostics)?;

        let sanity = check_rt_column(
            &values,
            self.config.rt_bounds,
            self.schema.rt_indicator(),
            column,
        );
        info!(
            artifact = %artifact.display(),
            rows = table.row_count(),
            any_above_lower = sanity.any_above_lower,
            all_below_upper = sanity.all_below_upper,
            "evaluated rt sanity properties"
        );
        let sanity = sanity.into_result()?;

        Ok(ValidationOutcome {
            rows: table.row_count(),
            run,
            artifact,
            sanity,
            diagnostics,
        })
    }

    fn enforce(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        if diagnostics.is_empty() {
            return Ok(());
        }
        if self.config.strict {
            return Err(Error::StrictModeViolation {
                count: diagnostics.len(),
                first: diagnostics[0].to_string(),
            });
        }
        for diagnostic in diagnostics {
            warn!("{diagnostic}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_are_checked_independently() {
        let report = check_rt_column(&[None, None, None], RtBounds::default(), "Rt_indicator", 21);
        assert!(report.all_below_upper, "upper bound holds vacuously");
        assert!(!report.any_above_lower);
        assert_eq!(report.non_null, 0);
        assert_eq!(report.failures().len(), 1);
        assert!(matches!(
            report.into_result(),
            Err(Error::StatisticalSanityViolation { failures, .. }) if failures.len() == 1
        ));
    }

    #[test]
    fn nulls_are_ignored_by_upper_bound() {
        let report = check_rt_column(
            &[None, Some(0.0), Some(1.2), None, Some(5.99)],
            RtBounds::default(),
            "Rt_indicator",
            21,
        );
        assert!(report.passed());
        assert_eq!(report.max, Some(5.99));
        assert_eq!(report.non_null, 3);
    }

    #[test]
    fn both_failures_are_reported() {
        let report = check_rt_column(&[Some(0.0), Some(6.0)], RtBounds::default(), "Rt_indicator", 21);
        assert!(!report.any_above_lower);
        assert!(!report.all_below_upper);
        let err = report.into_result().expect_err("both properties fail");
        assert!(err.to_string().contains("no value is greater than 0"));
        assert!(err.to_string().contains("reach 6"));
    }

    #[test]
    fn custom_bounds_are_honoured() {
        let bounds = RtBounds {
            lower_exclusive: 1.0,
            upper_exclusive: 2.0,
        };
        let report = check_rt_column(&[Some(0.5), Some(1.5)], bounds, "Rt_indicator", 0);
        assert!(report.passed());
    }

    #[test]
    fn context_tracks_nested_locations() {
        let mut ctx = ValidationContext::new();
        ctx.push("web_ui/county/16001.2.json".to_string());
        ctx.push("column 21".to_string());
        ctx.warning("row 3: string '1.1' coerced to float");
        ctx.pop();
        ctx.pop();
        ctx.warning("top level");
        assert!(ctx.has_warnings());

        let diagnostics = ctx.finish();
        assert_eq!(
            diagnostics[0].location.as_deref(),
            Some("web_ui/county/16001.2.json > column 21")
        );
        assert_eq!(diagnostics[1].to_string(), "top level");
    }
}
