use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// FIPS-style region key: two digits for a state, five for a county.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(fips: impl Into<String>) -> Self {
        Self(fips.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn level(&self) -> Option<AggregationLevel> {
        if !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match self.0.len() {
            2 => Some(AggregationLevel::State),
            5 => Some(AggregationLevel::County),
            _ => None,
        }
    }

    pub fn state_fips(&self) -> Option<&str> {
        self.level().map(|_| &self.0[..2])
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    State,
    County,
}

impl AggregationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationLevel::State => "state",
            AggregationLevel::County => "county",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub fips: String,
    pub abbreviation: String,
    pub name: String,
}

/// One row of county metadata. `state` is the two-letter abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyRecord {
    pub fips: String,
    pub county: String,
    pub state: String,
}

/// Names a resolved region for path construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub id: RegionId,
    pub level: AggregationLevel,
    pub state: String,
    pub county: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionRegistry {
    states: BTreeMap<String, StateRecord>,
    counties: BTreeMap<String, CountyRecord>,
}

impl RegionRegistry {
    pub fn new(states: Vec<StateRecord>, counties: Vec<CountyRecord>) -> Self {
        let mut registry = Self::default();
        for state in states {
            registry.states.insert(state.fips.clone(), state);
        }
        registry.extend_counties(counties);
        registry
    }

    /// US states and territories, plus a seed list of Idaho counties.
    pub fn builtin() -> Self {
        let states = BUILTIN_STATES
            .iter()
            .map(|(fips, abbreviation, name)| StateRecord {
                fips: (*fips).to_string(),
                abbreviation: (*abbreviation).to_string(),
                name: (*name).to_string(),
            })
            .collect();
        let counties = BUILTIN_COUNTIES
            .iter()
            .map(|(fips, county, state)| CountyRecord {
                fips: (*fips).to_string(),
                county: (*county).to_string(),
                state: (*state).to_string(),
            })
            .collect();
        Self::new(states, counties)
    }

    pub fn extend_counties(&mut self, counties: impl IntoIterator<Item = CountyRecord>) {
        for county in counties {
            self.counties.insert(county.fips.clone(), county);
        }
    }

    pub fn load_county_metadata(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let records: Vec<CountyRecord> = serde_json::from_str(&content)?;
        let count = records.len();
        self.extend_counties(records);
        Ok(count)
    }

    /// Accepts a state name, two-letter abbreviation or FIPS code.
    pub fn lookup_state(&self, key: &str) -> Result<&StateRecord> {
        let key = key.trim();
        self.states
            .get(key)
            .or_else(|| {
                self.states.values().find(|state| {
                    state.name.eq_ignore_ascii_case(key)
                        || state.abbreviation.eq_ignore_ascii_case(key)
                })
            })
            .ok_or_else(|| Error::UnknownRegion(key.to_string()))
    }

    pub fn describe(&self, region: &RegionId) -> Result<RegionInfo> {
        let unknown = || Error::UnknownRegion(region.to_string());
        let level = region.level().ok_or_else(unknown)?;
        match level {
            AggregationLevel::State => {
                let state = self.states.get(region.as_str()).ok_or_else(unknown)?;
                Ok(RegionInfo {
                    id: region.clone(),
                    level,
                    state: state.name.clone(),
                    county: None,
                })
            }
            AggregationLevel::County => {
                let county = self.counties.get(region.as_str()).ok_or_else(unknown)?;
                let state = self.lookup_state(&county.state)?;
                Ok(RegionInfo {
                    id: region.clone(),
                    level,
                    state: state.name.clone(),
                    county: Some(county.county.clone()),
                })
            }
        }
    }

    /// Counties registered under the given state, ordered by FIPS.
    pub fn counties_in(&self, state: &StateRecord) -> Vec<RegionId> {
        self.counties
            .values()
            .filter(|county| {
                county.fips.starts_with(&state.fips)
                    || county.state.eq_ignore_ascii_case(&state.abbreviation)
            })
            .map(|county| RegionId::new(county.fips.clone()))
            .collect()
    }
}

const BUILTIN_STATES: &[(&str, &str, &str)] = &[
    ("01", "AL", "Alabama"),
    ("02", "AK", "Alaska"),
    ("04", "AZ", "Arizona"),
    ("05", "AR", "Arkansas"),
    ("06", "CA", "California"),
    ("08", "CO", "Colorado"),
    ("09", "CT", "Connecticut"),
    ("10", "DE", "Delaware"),
    ("11", "DC", "District of Columbia"),
    ("12", "FL", "Florida"),
    ("13", "GA", "Georgia"),
    ("15", "HI", "Hawaii"),
    ("16", "ID", "Idaho"),
    ("17", "IL", "Illinois"),
    ("18", "IN", "Indiana"),
    ("19", "IA", "Iowa"),
    ("20", "KS", "Kansas"),
    ("21", "KY", "Kentucky"),
    ("22", "LA", "Louisiana"),
    ("23", "ME", "Maine"),
    ("24", "MD", "Maryland"),
    ("25", "MA", "Massachusetts"),
    ("26", "MI", "Michigan"),
    ("27", "MN", "Minnesota"),
    ("28", "MS", "Mississippi"),
    ("29", "MO", "Missouri"),
    ("30", "MT", "Montana"),
    ("31", "NE", "Nebraska"),
    ("32", "NV", "Nevada"),
    ("33", "NH", "New Hampshire"),
    ("34", "NJ", "New Jersey"),
    ("35", "NM", "New Mexico"),
    ("36", "NY", "New York"),
    ("37", "NC", "North Carolina"),
    ("38", "ND", "North Dakota"),
    ("39", "OH", "Ohio"),
    ("40", "OK", "Oklahoma"),
    ("41", "OR", "Oregon"),
    ("42", "PA", "Pennsylvania"),
    ("44", "RI", "Rhode Island"),
    ("45", "SC", "South Carolina"),
    ("46", "SD", "South Dakota"),
    ("47", "TN", "Tennessee"),
    ("48", "TX", "Texas"),
    ("49", "UT", "Utah"),
    ("50", "VT", "Vermont"),
    ("51", "VA", "Virginia"),
    ("53", "WA", "Washington"),
    ("54", "WV", "West Virginia"),
    ("55", "WI", "Wisconsin"),
    ("56", "WY", "Wyoming"),
    ("72", "PR", "Puerto Rico"),
];

const BUILTIN_COUNTIES: &[(&str, &str, &str)] = &[
    ("16001", "Ada County", "ID"),
    ("16005", "Bannock County", "ID"),
    ("16019", "Bonneville County", "ID"),
    ("16027", "Canyon County", "ID"),
    ("16055", "Kootenai County", "ID"),
    ("16083", "Twin Falls County", "ID"),
];
