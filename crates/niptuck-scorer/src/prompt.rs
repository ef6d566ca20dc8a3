/// Builds the single multimodal `generateContent` request for a scoring attempt.
///
/// Layout: one user turn holding every photo as an inline image part, followed by exactly
/// one text part (role header + JSON document with instructions, inputs, rubric and the
/// expected output skeleton).
use serde::Serialize;
use serde_json::{json, Value};

use niptuck_common::gemini::{Content, GenerateContentRequest, GenerationConfig, Part};
use niptuck_common::mcp_api::{AgeInput, ScoreParams, Sex};

use crate::error::ScoringError;
use crate::photos::{Photo, MAX_PHOTOS};
use crate::rubric::{Criterion, Rubric};

pub const DEFAULT_AGE: u32 = 30;
pub const DEFAULT_REGION: &str = "US";
const SPEC_VERSION: &str = "1.0";

const HEADER_LINES: [&str; 3] = [
    "ROLES: Plastic Surgeon, Model Scout, Makeup Artist Expert, Health Coach, Executive & Online Dating Coach.",
    "CALIBRATION: Optimistic but fair. Harmony and symmetry come first; no hype.",
    "TASK: Score the 5-bucket / 20-criterion rubric (1-5, step 0.25) across the supplied photos, per image first and then aggregated; give 4 expert tips per criterion and a prioritized 12-week protocol.",
];

/// Demographic inputs for one scoring attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringParams {
    pub sex: Sex,
    pub age: u32,
    pub ethnicity: String,
    pub region_standard: String,
    pub goals: Vec<String>,
}

impl ScoringParams {
    pub fn from_tool(params: &ScoreParams) -> Self {
        let region = params
            .region_standard
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION);
        Self {
            sex: params.sex,
            age: resolve_age(params.age.as_ref()),
            ethnicity: params
                .ethnicity
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            region_standard: region.to_string(),
            goals: params.goals.clone().unwrap_or_default(),
        }
    }
}

/// Leading decimal digits of the input, like a lenient integer parse; `DEFAULT_AGE` otherwise.
pub fn resolve_age(input: Option<&AgeInput>) -> u32 {
    match input {
        Some(AgeInput::Years(n)) => u32::try_from(*n).unwrap_or(DEFAULT_AGE),
        Some(AgeInput::Number(n)) if n.is_finite() && *n >= 0.0 && *n <= u32::MAX as f64 => {
            n.trunc() as u32
        }
        Some(AgeInput::Text(text)) => {
            let digits: String = text
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(DEFAULT_AGE)
        }
        Some(AgeInput::Number(_)) | Some(AgeInput::Other(_)) | None => DEFAULT_AGE,
    }
}

/// The fixed instruction block. Only the goals list varies.
pub fn instruction_block(goals: &[String]) -> String {
    let goals_json = serde_json::to_string(goals).unwrap_or_else(|_| "[]".to_string());
    [
        "STRICT CONTRACT:".to_string(),
        "• Score exactly 20 criteria (P1..O20) on 1-5 in steps of 0.25.".to_string(),
        "• For EACH criterion give (a) score, (b) rationale_140: at most 140 characters, ending with one micro-fix, (c) 4 expert tips: plastic_surgeon, makeup_artist, health_coach, exec_dating_coach. Never write N/A; when nothing should change, write a one-sentence Maintain plan.".to_string(),
        "• PER-IMAGE FIRST: return per_image[] items {image_index, pose: front|three_quarter|profile|unknown, per_criterion: {code: number}, total_weighted: number on 0-100}. THEN return aggregate.per_criterion as numeric means AND a top-level per_criterion object with detailed {score, rationale_140, tips{...}}.".to_string(),
        "• DYNAMICS: with no smile/motion clip supplied, down-weight the dynamic-expression criteria (Y14, Y16) by 50% in totals and set data_needed: ['smile_clip'].".to_string(),
        "• PERCENTILE: use priors by sex/age/region; when priors are unknown, cap at 97 and set provisional: true.".to_string(),
        "• 12-WEEK PROTOCOL: derive from the 3 lowest criteria. Weeks 1-4 foundations and topicals; weeks 5-8 add aesthetics; weeks 9-12 add long-term options only if those criteria remain below 3.5.".to_string(),
        "• TONE: optimistic, not gushy; no superlatives unless the score is at least 4.75.".to_string(),
        format!("• GOALS_SELECTED_JSON: {goals_json}"),
        "• VALIDATE BEFORE RETURN: (a) 20 rationales of at most 140 characters, (b) 80 expert tips present, (c) per_image length at least 3, (d) weeks 9-12 has at least 6 steps.".to_string(),
        "OUTPUT JSON ONLY.".to_string(),
    ]
    .join("\n")
}

/// Skeleton of the response shape the model is asked to fill.
pub fn output_schema() -> Value {
    json!({
        "per_image": [{
            "image_index": 0,
            "pose": "front|three_quarter|profile|unknown",
            "per_criterion": {},
            "total_weighted": 0
        }],
        "aggregate": { "per_criterion": {}, "total_weighted": 0 },
        "per_criterion": {},
        "protocol": { "weeks_1_4": [], "weeks_5_8": [], "weeks_9_12": [] },
        "percentile": { "z": 0, "pct": 0, "provisional": false },
        "data_needed": []
    })
}

#[derive(Serialize)]
struct PromptDocument<'a> {
    spec_version: &'static str,
    inline_spec: String,
    inputs: &'a ScoringParams,
    rubric: RubricDocument,
    llm_output_schema: Value,
}

#[derive(Serialize)]
struct RubricDocument {
    criteria: &'static [Criterion],
}

#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler {
    rubric: Rubric,
    temperature: f64,
}

impl PromptAssembler {
    pub fn new(rubric: Rubric, temperature: f64) -> Self {
        Self {
            rubric,
            temperature,
        }
    }

    /// The text part: header lines, a newline, then the serialized JSON document.
    pub fn text_part(&self, params: &ScoringParams) -> String {
        let document = PromptDocument {
            spec_version: SPEC_VERSION,
            inline_spec: instruction_block(&params.goals),
            inputs: params,
            rubric: RubricDocument {
                criteria: self.rubric.criteria(),
            },
            llm_output_schema: output_schema(),
        };
        // Plain data with string keys; serialization cannot fail.
        let json = serde_json::to_string(&document).unwrap_or_default();
        format!("{}\n{json}", HEADER_LINES.join("\n"))
    }

    pub fn build(
        &self,
        photos: &[Photo],
        params: &ScoringParams,
    ) -> Result<GenerateContentRequest, ScoringError> {
        if photos.is_empty() {
            return Err(ScoringError::NoPhotosSelected);
        }

        let mut parts: Vec<Part> = photos
            .iter()
            .take(MAX_PHOTOS)
            .map(|photo| Part::inline(photo.mime_type.clone(), photo.base64_body()))
            .collect();
        parts.push(Part::text(self.text_part(params)));

        Ok(GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig::json(self.temperature)),
        })
    }
}
