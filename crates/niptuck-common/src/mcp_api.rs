use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// Age as typed by the user. Fractions are truncated; text that does not parse and any
/// other JSON value fall back to the default age.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AgeInput {
    Years(i64),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetApiKeyParams {
    /// Raw Gemini API key as pasted. Stored verbatim; an empty string clears it.
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectPhotosParams {
    /// Image file paths. Only the first 5 are kept; previous selection is discarded.
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScoreParams {
    /// "male" or "female".
    pub sex: Sex,
    /// Age in years. Defaults to 30 when missing or unparseable.
    pub age: Option<AgeInput>,
    pub ethnicity: Option<String>,
    /// Regional beauty standard for percentile priors (default: "US").
    pub region_standard: Option<String>,
    /// Improvement goals, forwarded to the model verbatim.
    pub goals: Option<Vec<String>>,
    /// Overrides the stored API key for this call only.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetChartParams {
    /// "bell", "buckets", or a bucket letter: "P", "D", "S", "Y", "O".
    pub chart_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ToggleTipsParams {
    /// Criterion code such as "S10".
    pub code: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ApiKeyStatus {
    pub configured: bool,
    /// First and last four characters only.
    pub masked: Option<String>,
    pub valid_shape: bool,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PhotoSummary {
    pub index: usize,
    pub path: String,
    pub mime_type: String,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PhotoSelectionResponse {
    pub photos: Vec<PhotoSummary>,
    /// Paths dropped because they were beyond the first 5.
    pub discarded: usize,
    /// Paths within the first 5 that could not be read.
    pub unreadable: Vec<String>,
    /// True when the "no photos" placeholder would be shown.
    pub placeholder_visible: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CriterionInfo {
    pub code: String,
    pub name: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RubricResponse {
    pub criteria: Vec<CriterionInfo>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ChartResponse {
    pub chart_id: String,
    pub svg: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TipsStateResponse {
    /// Codes whose tip panel is currently expanded, in table order.
    pub expanded: Vec<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TextResponse {
    pub text: String,
}
