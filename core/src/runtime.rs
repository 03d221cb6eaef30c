use crate::artifact::{ArtifactKind, ArtifactResolver, InterventionIndex, StoredArtifact};
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::region::{RegionId, RegionInfo};
use crate::schema::{OutputSchema, RT_INDICATOR_CI90};
use crate::table::OutputTable;
use crate::validation::{Diagnostic, ValidationContext};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

const REPORT_PREVIEW_ROWS: usize = 14;

/// The epidemiological model. Implementations own all simulation logic; the
/// runner only persists what they return. Failures are usually reported as
/// [`Error::Model`].
pub trait ProjectionModel {
    fn project(&self, region: &RegionId, intervention: InterventionIndex) -> Result<OutputTable>;
}

impl<F> ProjectionModel for F
where
    F: Fn(&RegionId, InterventionIndex) -> Result<OutputTable>,
{
    fn project(&self, region: &RegionId, intervention: InterventionIndex) -> Result<OutputTable> {
        self(region, intervention)
    }
}

/// Builds artifacts for whole states. Returns only once every artifact is on
/// disk.
pub trait RunOrchestrator {
    fn build_all_for_states(&self, states: &[&str], generate_reports: bool) -> Result<RunReport>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub states: Vec<String>,
    pub regions: Vec<RegionExecution>,
    pub artifacts: Vec<StoredArtifact>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionExecution {
    pub region: RegionId,
    pub label: String,
    pub interventions: usize,
    pub report_written: bool,
}

impl RunReport {
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &StoredArtifact> {
        self.artifacts
            .iter()
            .filter(move |artifact| artifact.kind == kind)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.regions.is_empty() {
            writeln!(f, "No regions were built.")?;
            return Ok(());
        }

        writeln!(f, "Run results for {}:", self.states.join(", "))?;
        for region in &self.regions {
            let report = if region.report_written {
                ", report"
            } else {
                ""
            };
            writeln!(
                f,
                "  - {} ({}): {} intervention(s){}",
                region.label, region.region, region.interventions, report
            )?;
        }
        if !self.diagnostics.is_empty() {
            writeln!(f, "Diagnostics:")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "  - [warn] {diagnostic}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Runner<M> {
    resolver: ArtifactResolver,
    schema: OutputSchema,
    interventions: Vec<InterventionIndex>,
    model: M,
}

impl<M: ProjectionModel> Runner<M> {
    pub fn new(config: &RunnerConfig, model: M) -> Result<Self> {
        Ok(Self {
            resolver: config.build_resolver()?,
            schema: OutputSchema::can_model(),
            interventions: config.interventions.clone(),
            model,
        })
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    fn build_region(
        &self,
        info: &RegionInfo,
        generate_reports: bool,
        run: &mut RunReport,
        ctx: &mut ValidationContext,
    ) -> Result<()> {
        let label = region_label(info);
        let web_ui = self.resolver.resolve(&info.id, ArtifactKind::WebUiResult)?;
        let mut projections = Vec::with_capacity(self.interventions.len());

        for intervention in &self.interventions {
            let table = self.model.project(&info.id, *intervention)?;

            ctx.push(format!("{} intervention {}", info.id, intervention));
            if table.is_empty() {
                ctx.warning("projection produced no rows");
            } else if table.width() != self.schema.len() {
                ctx.warning(format!(
                    "projection has {} column(s), schema expects {}",
                    table.width(),
                    self.schema.len()
                ));
            }
            ctx.pop();

            let path = web_ui.for_intervention(*intervention);
            let bytes = serde_json::to_vec(&table.to_json())?;
            write_artifact(&path, &bytes)?;
            debug!(path = %path.display(), rows = table.row_count(), "wrote web ui result");

            run.artifacts.push(StoredArtifact {
                region: info.id.clone(),
                kind: ArtifactKind::WebUiResult,
                intervention: Some(*intervention),
                path,
            });
            projections.push((*intervention, table));
        }

        if generate_reports {
            let path = self
                .resolver
                .resolve(&info.id, ArtifactKind::RtInferenceReport)?
                .for_intervention(InterventionIndex::new(0));
            let generated_at = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string());
            let markdown = render_rt_report(&label, info, &generated_at, &projections, &self.schema, ctx);
            write_artifact(&path, markdown.as_bytes())?;
            debug!(path = %path.display(), "wrote rt inference report");

            run.artifacts.push(StoredArtifact {
                region: info.id.clone(),
                kind: ArtifactKind::RtInferenceReport,
                intervention: None,
                path,
            });
        }

        run.regions.push(RegionExecution {
            region: info.id.clone(),
            label,
            interventions: projections.len(),
            report_written: generate_reports,
        });
        Ok(())
    }
}

impl<M: ProjectionModel> RunOrchestrator for Runner<M> {
    fn build_all_for_states(&self, states: &[&str], generate_reports: bool) -> Result<RunReport> {
        let registry = self.resolver.registry();
        let mut run = RunReport::default();
        let mut ctx = ValidationContext::new();
        let mut seen = HashSet::new();

        for key in states {
            let state = registry.lookup_state(key)?.clone();
            let counties = registry.counties_in(&state);
            if counties.is_empty() {
                ctx.warning(format!("no counties registered for {}", state.name));
            }
            info!(state = %state.name, counties = counties.len(), "building state");
            run.states.push(state.name.clone());

            let regions = std::iter::once(RegionId::new(state.fips.clone())).chain(counties);
            for region in regions {
                if !seen.insert(region.clone()) {
                    continue;
                }
                let info = registry.describe(&region)?;
                self.build_region(&info, generate_reports, &mut run, &mut ctx)?;
            }
        }

        run.diagnostics = ctx.finish();
        info!(
            regions = run.regions.len(),
            artifacts = run.artifacts.len(),
            warnings = run.diagnostics.len(),
            "run complete"
        );
        Ok(run)
    }
}

/// Writes and syncs `bytes` so the file is visible once this returns.
fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }
    let mut file = fs::File::create(path).map_err(|err| Error::io(path, err))?;
    file.write_all(bytes).map_err(|err| Error::io(path, err))?;
    file.sync_all().map_err(|err| Error::io(path, err))?;
    Ok(())
}

fn region_label(info: &RegionInfo) -> String {
    match &info.county {
        Some(county) => format!("{}, {}", county, info.state),
        None => info.state.clone(),
    }
}

fn render_rt_report(
    label: &str,
    info: &RegionInfo,
    generated_at: &str,
    projections: &[(InterventionIndex, OutputTable)],
    schema: &OutputSchema,
    ctx: &mut ValidationContext,
) -> String {
    let mut md = String::new();
    md.push_str("# Rt Inference Report\n\n");
    md.push_str(&format!("**Region:** {} ({})\n\n", label, info.id));
    md.push_str(&format!("_Generated at {}_\n\n", generated_at));

    if projections.is_empty() {
        md.push_str("No projections were produced for this region.\n");
        return md;
    }

    let rt = schema.rt_index();
    let mut columns: Vec<usize> = ["day_num", "date"]
        .iter()
        .filter_map(|name| schema.index_of(name).ok())
        .collect();
    columns.push(rt);
    if let Ok(ci90) = schema.index_of(RT_INDICATOR_CI90) {
        columns.push(ci90);
    }

    for (intervention, table) in projections {
        md.push_str(&format!("## Intervention {}\n\n", intervention));
        ctx.push(format!("{} report intervention {}", info.id, intervention));
        let summary = match table.float_column(rt, ctx) {
            Ok(values) => summarize(&values),
            Err(err) => {
                ctx.warning(format!("Rt column unavailable: {err}"));
                None
            }
        };
        ctx.pop();

        match summary {
            Some((min, max, last)) => md.push_str(&format!(
                "| rows | Rt min | Rt max | Rt last |\n| --- | --- | --- | --- |\n| {} | {:.3} | {:.3} | {:.3} |\n\n",
                table.row_count(),
                min,
                max,
                last
            )),
            None => md.push_str("Rt indicator has no values.\n\n"),
        }

        let width = table.width();
        let visible: Vec<usize> = columns.iter().copied().filter(|index| *index < width).collect();
        if !visible.is_empty() {
            md.push_str("```text\n");
            md.push_str(&table.render_columns(schema, &visible, REPORT_PREVIEW_ROWS));
            md.push_str("\n```\n\n");
        }
    }

    md
}

fn summarize(values: &[Option<f64>]) -> Option<(f64, f64, f64)> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let last = *present.last()?;
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CAN_MODEL_OUTPUT_SCHEMA;
    use serde_json::{json, Value};

    fn projection(region: &RegionId, intervention: InterventionIndex) -> Result<OutputTable> {
        let rows = (0..5)
            .map(|day| {
                let mut row = vec![Value::Null; CAN_MODEL_OUTPUT_SCHEMA.len()];
                row[0] = json!(day);
                row[1] = json!(format!("2020-04-{:02}", day + 1));
                row[17] = json!(region.as_str().len() * 1000);
                row[21] = json!(2.0 - 0.1 * f64::from(day) - 0.05 * f64::from(intervention.get()));
                row
            })
            .collect();
        Ok(OutputTable::from_rows(rows))
    }

    fn runner(dir: &Path) -> Runner<fn(&RegionId, InterventionIndex) -> Result<OutputTable>> {
        let config = RunnerConfig::with_output_dir(dir);
        Runner::new(&config, projection as fn(&RegionId, InterventionIndex) -> _).expect("runner")
    }

    #[test]
    fn writes_web_ui_results_for_every_region_and_intervention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner(dir.path());
        let run = runner
            .build_all_for_states(&["Idaho"], false)
            .expect("run succeeds");

        // state + six builtin counties, four interventions each
        assert_eq!(run.regions.len(), 7);
        assert_eq!(run.artifacts_of(ArtifactKind::WebUiResult).count(), 28);
        assert_eq!(run.artifacts_of(ArtifactKind::RtInferenceReport).count(), 0);
        assert!(run.diagnostics.is_empty());

        for artifact in &run.artifacts {
            assert!(artifact.path.exists(), "{:?} missing", artifact.path);
        }
        assert!(dir.path().join("web_ui/state/16.0.json").exists());
        assert!(dir.path().join("web_ui/county/16001.2.json").exists());
    }

    #[test]
    fn report_generation_writes_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner(dir.path());
        let run = runner
            .build_all_for_states(&["ID"], true)
            .expect("run succeeds");

        let report = run
            .artifacts_of(ArtifactKind::RtInferenceReport)
            .find(|artifact| artifact.region == RegionId::new("16001"))
            .expect("ada county report");
        let contents = fs::read_to_string(&report.path).expect("report readable");
        assert!(contents.contains("# Rt Inference Report"));
        assert!(contents.contains("Ada County, Idaho (16001)"));
        assert!(contents.contains("## Intervention 2"));
        assert!(contents.contains("Rt_indicator"));
        assert!(run.regions.iter().all(|region| region.report_written));
    }

    #[test]
    fn schema_mismatch_is_a_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RunnerConfig {
            interventions: vec![InterventionIndex::new(1)],
            ..RunnerConfig::with_output_dir(dir.path())
        };
        let narrow = |_: &RegionId, _: InterventionIndex| {
            Ok::<_, Error>(OutputTable::from_rows(vec![vec![json!(0), json!(1.2)]]))
        };
        let runner = Runner::new(&config, narrow).expect("runner");
        let run = runner
            .build_all_for_states(&["Idaho"], false)
            .expect("run succeeds");
        assert_eq!(run.diagnostics.len(), 7);
        assert!(run.diagnostics[0].message.contains("schema expects 23"));
    }

    #[test]
    fn model_failure_aborts_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RunnerConfig::with_output_dir(dir.path());
        let failing = |region: &RegionId, _: InterventionIndex| {
            if region.as_str() == "16027" {
                Err(Error::Model {
                    region: region.to_string(),
                    message: "fit did not converge".to_string(),
                })
            } else {
                Ok(OutputTable::default())
            }
        };
        let runner = Runner::new(&config, failing).expect("runner");
        let err = runner
            .build_all_for_states(&["Idaho"], false)
            .expect_err("model error propagates");
        assert!(matches!(err, Error::Model { region, .. } if region == "16027"));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = runner(dir.path())
            .build_all_for_states(&["Cascadia"], false)
            .expect_err("unknown state");
        assert!(matches!(err, Error::UnknownRegion(_)));
    }

    #[test]
    fn report_display_lists_regions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = runner(dir.path())
            .build_all_for_states(&["Idaho"], false)
            .expect("run succeeds");
        let rendered = run.to_string();
        assert!(rendered.starts_with("Run results for Idaho:"));
        assert!(rendered.contains("Ada County, Idaho (16001): 4 intervention(s)"));
    }
}
