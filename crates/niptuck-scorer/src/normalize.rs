/// Response normalization.
///
/// The model's answer is only loosely shaped: a criterion may be a bare number or an object
/// carrying its score under one of several keys, totals may be on a 1-5 or 0-100 scale, and
/// any field may be missing. Everything here has a fallback; nothing in this module fails.
use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{
    AggregateResult, BucketScores, CriterionResult, ImageResult, Percentile, Protocol, Score,
    TipRole, Tips, TotalSource,
};
use crate::rubric::Bucket;

/// Image totals at or below this are read as 1-5 and rescaled; above it they are taken as
/// already 0-100. The model is also told to report image totals on 0-100.
pub const ONE_TO_FIVE_CEILING: f64 = 5.0001;

/// Average used for the overall total when no criterion resolves.
pub const MIDPOINT_SCORE: f64 = 3.0;

pub const SCORE_MIN: f64 = 1.0;
pub const SCORE_MAX: f64 = 5.0;

/// How a criterion value carried its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreField {
    Number(f64),
    WithScore(f64),
    WithValue(f64),
    WithAvg(f64),
    Unresolvable,
}

type ScoreExtractor = (&'static str, fn(f64) -> ScoreField);

/// Tried in order on object values; the first numeric field wins.
const SCORE_EXTRACTORS: &[ScoreExtractor] = &[
    ("score", ScoreField::WithScore),
    ("value", ScoreField::WithValue),
    ("avg", ScoreField::WithAvg),
];

/// Tried in order; the first non-empty string wins.
const RATIONALE_KEYS: &[&str] = &["rationale_140", "why", "rationale"];

/// Tried in order on each `per_image` entry; the first present (non-null) field is used.
const IMAGE_TOTAL_KEYS: &[&str] = &["total_weighted", "total", "avg"];

impl ScoreField {
    pub fn decode(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(Self::Unresolvable, Self::Number),
            Value::Object(map) => SCORE_EXTRACTORS
                .iter()
                .find_map(|(key, wrap)| map.get(*key).and_then(Value::as_f64).map(wrap))
                .unwrap_or(Self::Unresolvable),
            _ => Self::Unresolvable,
        }
    }

    pub fn raw(self) -> Option<f64> {
        match self {
            Self::Number(v) | Self::WithScore(v) | Self::WithValue(v) | Self::WithAvg(v) => {
                Some(v)
            }
            Self::Unresolvable => None,
        }
    }

    /// Finite scores clamped into [1,5]; everything else is unknown.
    pub fn to_score(self) -> Score {
        match self.raw() {
            Some(v) if v.is_finite() => Score::Known(v.clamp(SCORE_MIN, SCORE_MAX)),
            _ => Score::Unknown,
        }
    }
}

/// Convert a 1-5 average to the 0-100 scale.
pub fn one_to_five_to_100(avg: f64) -> f64 {
    (avg - 1.0) / 4.0 * 100.0
}

/// Per-image total to 0-100, using the `ONE_TO_FIVE_CEILING` scale heuristic.
pub fn image_total_to_100(x: f64) -> f64 {
    if x <= ONE_TO_FIVE_CEILING {
        one_to_five_to_100(x)
    } else {
        x
    }
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

pub fn normalize_criterion(code: &str, value: &Value) -> CriterionResult {
    let score = ScoreField::decode(value).to_score();
    let Some(obj) = value.as_object() else {
        return CriterionResult {
            code: code.to_string(),
            name: None,
            score,
            rationale: None,
            tips: Tips::default(),
        };
    };

    let rationale = RATIONALE_KEYS
        .iter()
        .find_map(|key| non_empty_str(obj, key))
        .map(str::to_string);

    let mut tips = Tips::default();
    if let Some(raw_tips) = obj.get("tips").and_then(Value::as_object) {
        for role in TipRole::ALL {
            if let Some(text) = non_empty_str(raw_tips, role.key()) {
                tips.set(role, text.to_string());
            }
        }
    }

    CriterionResult {
        code: code.to_string(),
        name: non_empty_str(obj, "name").map(str::to_string),
        score,
        rationale,
        tips,
    }
}

/// Normalize every entry of a `per_criterion`-like object. Non-objects yield an empty map.
pub fn normalize_criteria(value: Option<&Value>) -> BTreeMap<String, CriterionResult> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(code, v)| (code.clone(), normalize_criterion(code, v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Combine `aggregate.per_criterion` (numeric means) with the detailed top-level map.
///
/// Scores prefer the aggregate entry when it resolves; text and tips prefer the detailed entry.
fn merge_criteria(
    aggregate: BTreeMap<String, CriterionResult>,
    mut detailed: BTreeMap<String, CriterionResult>,
) -> BTreeMap<String, CriterionResult> {
    for (code, agg) in aggregate {
        match detailed.get_mut(&code) {
            Some(entry) => {
                if agg.score.is_known() {
                    entry.score = agg.score;
                }
                if entry.name.is_none() {
                    entry.name = agg.name;
                }
                if entry.rationale.is_none() {
                    entry.rationale = agg.rationale;
                }
                if entry.tips.is_empty() {
                    entry.tips = agg.tips;
                }
            }
            None => {
                detailed.insert(code, agg);
            }
        }
    }
    detailed
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean of resolved scores per bucket; 0 when a bucket has none.
pub fn bucket_averages(criteria: &BTreeMap<String, CriterionResult>) -> BucketScores {
    let mut groups: [Vec<f64>; 5] = Default::default();
    for criterion in criteria.values() {
        if let (Some(bucket), Some(score)) = (criterion.bucket(), criterion.score.value()) {
            groups[bucket.index()].push(score);
        }
    }
    let mut out = [0.0; 5];
    for bucket in Bucket::ALL {
        out[bucket.index()] = mean(&groups[bucket.index()]).unwrap_or(0.0);
    }
    BucketScores::from_array(out)
}

/// Overall 0-100 total from per-criterion scores, with the midpoint fallback.
pub fn derive_total(criteria: &BTreeMap<String, CriterionResult>) -> (f64, TotalSource) {
    let scores: Vec<f64> = criteria.values().filter_map(|c| c.score.value()).collect();
    match mean(&scores) {
        Some(avg) => (one_to_five_to_100(avg), TotalSource::Derived),
        None => (one_to_five_to_100(MIDPOINT_SCORE), TotalSource::Midpoint),
    }
}

fn normalize_image(value: &Value) -> ImageResult {
    let obj = value.as_object();
    let field = |key: &str| obj.and_then(|o| o.get(key));

    let total_100 = IMAGE_TOTAL_KEYS
        .iter()
        .find_map(|key| field(*key).filter(|v| !v.is_null()))
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(image_total_to_100);

    ImageResult {
        image_index: field("image_index").and_then(Value::as_i64),
        pose: field("pose")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("unknown")
            .to_string(),
        per_criterion: normalize_criteria(field("per_criterion")),
        total_100,
    }
}

/// Strings pass through; any other JSON value is kept as its compact serialization.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn normalize(raw: &Value) -> AggregateResult {
    let aggregate = raw.get("aggregate");
    let top_level = raw.get("per_criterion").filter(|v| v.is_object());
    let aggregate_criteria = aggregate.and_then(|a| a.get("per_criterion"));

    let (total_weighted, total_source) = match aggregate
        .and_then(|a| a.get("total_weighted"))
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
    {
        Some(total) => (total, TotalSource::Explicit),
        None => derive_total(&normalize_criteria(top_level.or(aggregate_criteria))),
    };

    let per_criterion = merge_criteria(
        normalize_criteria(aggregate_criteria),
        normalize_criteria(top_level),
    );
    let buckets = bucket_averages(&per_criterion);

    let per_image = raw
        .get("per_image")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(normalize_image).collect())
        .unwrap_or_default();

    let percentile = raw.get("percentile");
    let percentile = Percentile {
        pct: percentile
            .and_then(|p| p.get("pct"))
            .and_then(Value::as_f64),
        provisional: percentile
            .and_then(|p| p.get("provisional"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    let protocol = raw.get("protocol");
    let protocol = Protocol {
        weeks_1_4: string_list(protocol.and_then(|p| p.get("weeks_1_4"))),
        weeks_5_8: string_list(protocol.and_then(|p| p.get("weeks_5_8"))),
        weeks_9_12: string_list(protocol.and_then(|p| p.get("weeks_9_12"))),
    };

    let result = AggregateResult {
        total_weighted,
        total_source,
        per_criterion,
        buckets,
        per_image,
        percentile,
        protocol,
        data_needed: string_list(raw.get("data_needed")),
    };
    debug!(
        total = result.total_weighted,
        source = ?result.total_source,
        criteria = result.per_criterion.len(),
        images = result.per_image.len(),
        "response normalized"
    );
    result
}
