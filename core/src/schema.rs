use crate::error::{Error, Result};
use indexmap::IndexSet;
use serde::Serialize;

pub const RT_INDICATOR: &str = "Rt_indicator";
pub const RT_INDICATOR_CI90: &str = "Rt_indicator_ci90";

/// Column order of the CAN model web UI output.
pub const CAN_MODEL_OUTPUT_SCHEMA: &[&str] = &[
    "day_num",
    "date",
    "total",
    "susceptible",
    "exposed",
    "infected",
    "infected_a",
    "infected_b",
    "infected_c",
    "all_hospitalized",
    "all_infected",
    "dead",
    "beds",
    "i",
    "j",
    "k",
    "l",
    "population",
    "m",
    "n",
    "current_ventilated",
    RT_INDICATOR,
    RT_INDICATOR_CI90,
];

/// Ordered, unique indicator names. Every registered name maps to exactly one
/// column position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSchema {
    indicators: IndexSet<String>,
    rt_indicator: String,
}

impl OutputSchema {
    pub fn new<I, S>(names: I, rt_indicator: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut indicators = IndexSet::new();
        for name in names {
            let name = name.into();
            if indicators.contains(&name) {
                return Err(Error::DuplicateIndicator(name));
            }
            indicators.insert(name);
        }
        if !indicators.contains(rt_indicator) {
            return Err(Error::MissingRtIndicator(rt_indicator.to_string()));
        }
        Ok(Self {
            indicators,
            rt_indicator: rt_indicator.to_string(),
        })
    }

    pub fn can_model() -> Self {
        Self {
            indicators: CAN_MODEL_OUTPUT_SCHEMA
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            rt_indicator: RT_INDICATOR.to_string(),
        }
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.indicators
            .get_index_of(name)
            .ok_or_else(|| Error::UnknownIndicator(name.to_string()))
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.indicators.get_index(index).map(String::as_str)
    }

    pub fn rt_indicator(&self) -> &str {
        &self.rt_indicator
    }

    pub fn rt_index(&self) -> usize {
        self.indicators
            .get_index_of(self.rt_indicator.as_str())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indicators.iter().map(String::as_str)
    }
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::can_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn index_of_is_total_and_injective() {
        let schema = OutputSchema::can_model();
        let mut seen = HashSet::new();
        for (position, name) in schema.names().enumerate() {
            let index = schema.index_of(name).expect("registered name resolves");
            assert_eq!(index, position);
            assert!(seen.insert(index), "index {index} assigned twice");
        }
        assert_eq!(seen.len(), schema.len());
    }

    #[test]
    fn rt_indicator_position() {
        let schema = OutputSchema::can_model();
        assert_eq!(schema.index_of(RT_INDICATOR).expect("rt present"), 21);
        assert_eq!(schema.rt_index(), 21);
        assert_eq!(schema.name_at(21), Some(RT_INDICATOR));
    }

    #[test]
    fn unknown_indicator_is_rejected() {
        let schema = OutputSchema::can_model();
        assert!(matches!(
            schema.index_of("Rt"),
            Err(Error::UnknownIndicator(name)) if name == "Rt"
        ));
    }

    #[test]
    fn construction_enforces_uniqueness_and_rt_presence() {
        assert!(matches!(
            OutputSchema::new(["date", "date", RT_INDICATOR], RT_INDICATOR),
            Err(Error::DuplicateIndicator(name)) if name == "date"
        ));
        assert!(matches!(
            OutputSchema::new(["date", "dead"], RT_INDICATOR),
            Err(Error::MissingRtIndicator(_))
        ));

        let schema = OutputSchema::new(["date", RT_INDICATOR], RT_INDICATOR).expect("valid");
        assert_eq!(schema.rt_index(), 1);
    }
}
