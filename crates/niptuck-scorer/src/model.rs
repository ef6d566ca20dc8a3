use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Serialize;

use crate::rubric::Bucket;

/// Placeholder shown wherever a value is missing.
pub const NO_DATA: &str = "—";

/// A criterion score after normalization: a number in [1,5] or an explicit "no data".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Known(f64),
    Unknown,
}

impl Score {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Two decimals, or the no-data placeholder.
    pub fn display(self) -> String {
        match self {
            Self::Known(v) => format!("{v:.2}"),
            Self::Unknown => NO_DATA.to_string(),
        }
    }
}

/// The four expert roles every criterion carries a tip for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipRole {
    PlasticSurgeon,
    MakeupArtist,
    HealthCoach,
    ExecDatingCoach,
}

impl TipRole {
    pub const ALL: [TipRole; 4] = [
        TipRole::PlasticSurgeon,
        TipRole::MakeupArtist,
        TipRole::HealthCoach,
        TipRole::ExecDatingCoach,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::PlasticSurgeon => "plastic_surgeon",
            Self::MakeupArtist => "makeup_artist",
            Self::HealthCoach => "health_coach",
            Self::ExecDatingCoach => "exec_dating_coach",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PlasticSurgeon => "Plastic Surgeon",
            Self::MakeupArtist => "Makeup Artist",
            Self::HealthCoach => "Health Coach",
            Self::ExecDatingCoach => "Exec & Dating Coach",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct Tips {
    pub plastic_surgeon: Option<String>,
    pub makeup_artist: Option<String>,
    pub health_coach: Option<String>,
    pub exec_dating_coach: Option<String>,
}

impl Tips {
    pub fn get(&self, role: TipRole) -> Option<&str> {
        match role {
            TipRole::PlasticSurgeon => self.plastic_surgeon.as_deref(),
            TipRole::MakeupArtist => self.makeup_artist.as_deref(),
            TipRole::HealthCoach => self.health_coach.as_deref(),
            TipRole::ExecDatingCoach => self.exec_dating_coach.as_deref(),
        }
    }

    pub fn set(&mut self, role: TipRole, value: String) {
        let slot = match role {
            TipRole::PlasticSurgeon => &mut self.plastic_surgeon,
            TipRole::MakeupArtist => &mut self.makeup_artist,
            TipRole::HealthCoach => &mut self.health_coach,
            TipRole::ExecDatingCoach => &mut self.exec_dating_coach,
        };
        *slot = Some(value);
    }

    /// Tip text for a role, or the placeholder when the model left it out.
    pub fn display(&self, role: TipRole) -> &str {
        self.get(role).unwrap_or(NO_DATA)
    }

    pub fn is_empty(&self) -> bool {
        TipRole::ALL.iter().all(|r| self.get(*r).is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct CriterionResult {
    pub code: String,
    /// Model-supplied label; the rubric name is used when absent.
    pub name: Option<String>,
    pub score: Score,
    pub rationale: Option<String>,
    pub tips: Tips,
}

impl CriterionResult {
    pub fn bucket(&self) -> Option<Bucket> {
        Bucket::from_code(&self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    /// `aggregate.total_weighted` was a number.
    Explicit,
    /// Averaged from per-criterion scores.
    Derived,
    /// No score resolved; the 1-5 midpoint was used.
    Midpoint,
}

/// Mean score per bucket on the 1-5 scale; 0 for a bucket with no resolved scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, JsonSchema)]
pub struct BucketScores {
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "D")]
    pub d: f64,
    #[serde(rename = "S")]
    pub s: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "O")]
    pub o: f64,
}

impl BucketScores {
    pub fn get(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::P => self.p,
            Bucket::D => self.d,
            Bucket::S => self.s,
            Bucket::Y => self.y,
            Bucket::O => self.o,
        }
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        let [p, d, s, y, o] = values;
        Self { p, d, s, y, o }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ImageResult {
    pub image_index: Option<i64>,
    pub pose: String,
    pub per_criterion: BTreeMap<String, CriterionResult>,
    /// Image total on the 0-100 scale; `None` when the model gave nothing numeric.
    pub total_100: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct Percentile {
    pub pct: Option<f64>,
    pub provisional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct Protocol {
    pub weeks_1_4: Vec<String>,
    pub weeks_5_8: Vec<String>,
    pub weeks_9_12: Vec<String>,
}

impl Protocol {
    pub fn phases(&self) -> [(&'static str, &[String]); 3] {
        [
            ("Weeks 1-4", &self.weeks_1_4),
            ("Weeks 5-8", &self.weeks_5_8),
            ("Weeks 9-12", &self.weeks_9_12),
        ]
    }
}

/// The normalized outcome of one scoring call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct AggregateResult {
    /// Overall score on the 0-100 scale.
    pub total_weighted: f64,
    pub total_source: TotalSource,
    pub per_criterion: BTreeMap<String, CriterionResult>,
    pub buckets: BucketScores,
    pub per_image: Vec<ImageResult>,
    pub percentile: Percentile,
    pub protocol: Protocol,
    pub data_needed: Vec<String>,
}
