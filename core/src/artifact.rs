use crate::error::{Error, Result};
use crate::region::{RegionId, RegionInfo, RegionRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Marker embedded in templates of intervention-dependent artifacts.
pub const INTERVENTION_MARKER: &str = "__INTERVENTION_IDX__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RtInferenceReport,
    RtInferenceResult,
    MleFitResult,
    MleFitModel,
    MleFitReport,
    EnsembleResult,
    EnsembleReport,
    WebUiResult,
    BacktestResult,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::RtInferenceReport,
        ArtifactKind::RtInferenceResult,
        ArtifactKind::MleFitResult,
        ArtifactKind::MleFitModel,
        ArtifactKind::MleFitReport,
        ArtifactKind::EnsembleResult,
        ArtifactKind::EnsembleReport,
        ArtifactKind::WebUiResult,
        ArtifactKind::BacktestResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::RtInferenceReport => "rt_inference_report",
            ArtifactKind::RtInferenceResult => "rt_inference_result",
            ArtifactKind::MleFitResult => "mle_fit_result",
            ArtifactKind::MleFitModel => "mle_fit_model",
            ArtifactKind::MleFitReport => "mle_fit_report",
            ArtifactKind::EnsembleResult => "ensemble_result",
            ArtifactKind::EnsembleReport => "ensemble_report",
            ArtifactKind::WebUiResult => "web_ui_result",
            ArtifactKind::BacktestResult => "backtest_result",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            ArtifactKind::RtInferenceReport => {
                "pyseir/{state}/reports/Rt_results__{name}__{fips}.md"
            }
            ArtifactKind::RtInferenceResult => "pyseir/{state}/data/Rt_results__{name}__{fips}.json",
            ArtifactKind::MleFitResult => {
                "pyseir/{state}/data/mle_fit_results__{name}__{fips}.json"
            }
            ArtifactKind::MleFitModel => {
                "pyseir/{state}/models/mle_fit_model__{name}__{fips}.json"
            }
            ArtifactKind::MleFitReport => {
                "pyseir/{state}/reports/mle_fit_report__{name}__{fips}.md"
            }
            ArtifactKind::EnsembleResult => {
                "pyseir/{state}/data/ensemble_projections__{name}__{fips}.json"
            }
            ArtifactKind::EnsembleReport => {
                "pyseir/{state}/reports/ensemble_projections__{name}__{fips}.md"
            }
            ArtifactKind::WebUiResult => "web_ui/{level}/{fips}.__INTERVENTION_IDX__.json",
            ArtifactKind::BacktestResult => "pyseir/{state}/backtest_results__{name}__{fips}.json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ArtifactKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| Error::UnknownArtifactKind(needle.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterventionIndex(u32);

impl InterventionIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterventionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relative path templates per artifact kind. Kinds without a template are
/// rejected by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLayout {
    templates: BTreeMap<ArtifactKind, String>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        let templates = ArtifactKind::ALL
            .iter()
            .map(|kind| (*kind, kind.default_template().to_string()))
            .collect();
        Self { templates }
    }
}

impl ArtifactLayout {
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, kind: ArtifactKind, template: impl Into<String>) -> Self {
        self.templates.insert(kind, template.into());
        self
    }

    pub fn merge(&mut self, overrides: &BTreeMap<ArtifactKind, String>) {
        for (kind, template) in overrides {
            self.templates.insert(*kind, template.clone());
        }
    }

    pub fn template(&self, kind: ArtifactKind) -> Option<&str> {
        self.templates.get(&kind).map(String::as_str)
    }
}

/// A resolved path template. Concrete paths come only from
/// [`ArtifactPath::for_intervention`]; the marker is substituted in the
/// layout-relative part only, never in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactPath {
    region: RegionId,
    kind: ArtifactKind,
    output_dir: PathBuf,
    relative: String,
}

impl ArtifactPath {
    pub fn region(&self) -> &RegionId {
        &self.region
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn template(&self) -> PathBuf {
        self.output_dir.join(&self.relative)
    }

    pub fn is_per_intervention(&self) -> bool {
        self.relative.contains(INTERVENTION_MARKER)
    }

    pub fn for_intervention(&self, index: InterventionIndex) -> PathBuf {
        self.output_dir.join(
            self.relative
                .replace(INTERVENTION_MARKER, &index.get().to_string()),
        )
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template().display())
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    output_dir: PathBuf,
    layout: ArtifactLayout,
    registry: RegionRegistry,
}

impl ArtifactResolver {
    pub fn new(output_dir: impl Into<PathBuf>, layout: ArtifactLayout, registry: RegionRegistry) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout,
            registry,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub fn resolve(&self, region: &RegionId, kind: ArtifactKind) -> Result<ArtifactPath> {
        let template = self
            .layout
            .template(kind)
            .ok_or_else(|| Error::UnknownArtifactKind(kind.as_str().to_string()))?;
        let info = self.registry.describe(region)?;
        Ok(ArtifactPath {
            region: region.clone(),
            kind,
            output_dir: self.output_dir.clone(),
            relative: fill_template(template, &info),
        })
    }
}

fn fill_template(template: &str, info: &RegionInfo) -> String {
    let state = sanitize_label(&info.state);
    let name = match &info.county {
        Some(county) => format!("{}__{}", state, sanitize_label(county)),
        None => state.clone(),
    };
    template
        .replace("{level}", info.level.as_str())
        .replace("{fips}", info.id.as_str())
        .replace("{state}", &state)
        .replace("{name}", &name)
}

pub(crate) fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// An artifact written by one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub region: RegionId,
    pub kind: ArtifactKind,
    pub intervention: Option<InterventionIndex>,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ArtifactResolver {
        ArtifactResolver::new("output", ArtifactLayout::default(), RegionRegistry::builtin())
    }

    #[test]
    fn resolve_is_deterministic_for_every_kind() {
        let resolver = resolver();
        for region in ["16", "16001", "16083"] {
            let region = RegionId::new(region);
            for kind in ArtifactKind::ALL {
                let first = resolver.resolve(&region, kind).expect("resolves");
                let second = resolver.resolve(&region, kind).expect("resolves");
                assert_eq!(first, second);
                assert_eq!(first.template(), second.template());
            }
        }
    }

    #[test]
    fn web_ui_template_carries_the_marker() {
        let path = resolver()
            .resolve(&RegionId::new("16001"), ArtifactKind::WebUiResult)
            .expect("resolves");
        assert!(path.is_per_intervention());
        assert_eq!(
            path.template(),
            Path::new("output")
                .join("web_ui")
                .join("county")
                .join("16001.__INTERVENTION_IDX__.json")
        );
        assert_eq!(
            path.for_intervention(InterventionIndex::new(2)),
            Path::new("output")
                .join("web_ui")
                .join("county")
                .join("16001.2.json")
        );
    }

    #[test]
    fn county_names_are_sanitized() {
        let path = resolver()
            .resolve(&RegionId::new("16083"), ArtifactKind::RtInferenceResult)
            .expect("resolves");
        assert!(!path.is_per_intervention());
        assert!(path
            .template()
            .ends_with("Rt_results__Idaho__Twin_Falls_County__16083.json"));
        assert_eq!(
            path.for_intervention(InterventionIndex::new(0)),
            path.for_intervention(InterventionIndex::new(3))
        );
    }

    #[test]
    fn marker_in_output_dir_is_left_alone() {
        let resolver = ArtifactResolver::new(
            "runs/__INTERVENTION_IDX__",
            ArtifactLayout::default(),
            RegionRegistry::builtin(),
        );
        let path = resolver
            .resolve(&RegionId::new("16"), ArtifactKind::WebUiResult)
            .expect("resolves");
        assert_eq!(
            path.for_intervention(InterventionIndex::new(1)),
            Path::new("runs/__INTERVENTION_IDX__")
                .join("web_ui")
                .join("state")
                .join("16.1.json")
        );

        let fixed = resolver
            .resolve(&RegionId::new("16"), ArtifactKind::EnsembleResult)
            .expect("resolves");
        assert!(!fixed.is_per_intervention());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_output_dir_is_preserved() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = PathBuf::from(OsStr::from_bytes(b"out\xff"));
        let resolver =
            ArtifactResolver::new(dir.clone(), ArtifactLayout::default(), RegionRegistry::builtin());
        let path = resolver
            .resolve(&RegionId::new("16001"), ArtifactKind::WebUiResult)
            .expect("resolves")
            .for_intervention(InterventionIndex::new(2));
        assert!(path.starts_with(&dir));
        assert_eq!(path, dir.join("web_ui/county/16001.2.json"));
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        let layout = ArtifactLayout::empty().with_template(
            ArtifactKind::WebUiResult,
            ArtifactKind::WebUiResult.default_template(),
        );
        let resolver = ArtifactResolver::new("output", layout, RegionRegistry::builtin());
        let err = resolver
            .resolve(&RegionId::new("16001"), ArtifactKind::EnsembleResult)
            .expect_err("ensemble result is not in the layout");
        assert!(matches!(err, Error::UnknownArtifactKind(kind) if kind == "ensemble_result"));
    }

    #[test]
    fn kind_parses_from_tag() {
        assert_eq!(
            "web_ui_result".parse::<ArtifactKind>().expect("known tag"),
            ArtifactKind::WebUiResult
        );
        assert!(matches!(
            "WEB_UI_RESULTS".parse::<ArtifactKind>(),
            Err(Error::UnknownArtifactKind(_))
        ));
    }

    #[test]
    fn unknown_region_comes_from_registry() {
        let err = resolver()
            .resolve(&RegionId::new("99001"), ArtifactKind::WebUiResult)
            .expect_err("unregistered county");
        assert!(matches!(err, Error::UnknownRegion(_)));
    }
}
