/// Presentation: turns one normalized result into the report, table and charts.
pub mod charts;
pub mod protocol;
pub mod table;

use schemars::JsonSchema;
use serde::Serialize;

use crate::model::{AggregateResult, BucketScores, ImageResult, Percentile, TotalSource, NO_DATA};
use crate::rubric::Rubric;

use self::charts::{ChartId, ChartRegistry};
use self::protocol::ProtocolPhase;
use self::table::DetailRow;

pub const PROVISIONAL_NOTE: &str = "provisional (priors missing)";

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Headline {
    /// Overall score, one decimal.
    pub total: String,
    /// `"NN.N%"` or a dash.
    pub percentile: String,
    pub percentile_note: Option<String>,
    /// `"<score> (<pose>)"` per image joined by `" · "`.
    pub per_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ScoreReport {
    pub headline: Headline,
    pub total_weighted: f64,
    pub total_source: TotalSource,
    pub buckets: BucketScores,
    pub rows: Vec<DetailRow>,
    pub protocol: Vec<ProtocolPhase>,
    pub data_needed_note: Option<String>,
    /// Ids accepted by `get_chart`.
    pub charts: Vec<String>,
}

pub fn percentile_text(percentile: &Percentile) -> String {
    match percentile.pct {
        Some(pct) => format!("{pct:.1}%"),
        None => NO_DATA.to_string(),
    }
}

pub fn per_image_line(images: &[ImageResult]) -> String {
    if images.is_empty() {
        return NO_DATA.to_string();
    }
    images
        .iter()
        .map(|image| format!("{:.1} ({})", image.total_100.unwrap_or(0.0), image.pose))
        .collect::<Vec<_>>()
        .join(" · ")
}

pub fn headline(result: &AggregateResult) -> Headline {
    Headline {
        total: format!("{:.1}", result.total_weighted),
        percentile: percentile_text(&result.percentile),
        percentile_note: result
            .percentile
            .provisional
            .then(|| PROVISIONAL_NOTE.to_string()),
        per_image: per_image_line(&result.per_image),
    }
}

/// Build the report and swap a fresh set of charts into `charts`.
pub fn render(result: &AggregateResult, rubric: &Rubric, charts: &mut ChartRegistry) -> ScoreReport {
    charts::render_all(result, rubric, charts);

    ScoreReport {
        headline: headline(result),
        total_weighted: result.total_weighted,
        total_source: result.total_source,
        buckets: result.buckets,
        rows: table::sorted_rows(&result.per_criterion, rubric),
        protocol: protocol::phases(&result.protocol),
        data_needed_note: protocol::data_needed_note(&result.data_needed).map(str::to_string),
        charts: ChartId::all().map(|id| id.to_string()).collect(),
    }
}
