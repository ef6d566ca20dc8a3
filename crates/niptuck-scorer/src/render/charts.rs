// SVG charts for the score report: percentile bell and the bucket radars.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::model::{AggregateResult, Score};
use crate::rubric::{Bucket, Rubric};

use super::table::sorted_rows;

pub const BELL_MEAN: f64 = 60.0;
pub const BELL_SD: f64 = 10.0;
pub const BELL_X_MIN: u32 = 20;
pub const BELL_X_MAX: u32 = 100;
/// Marker bar height relative to the curve's peak.
pub const MARKER_HEIGHT_RATIO: f64 = 1.15;
pub const RADAR_SCALE_MAX: f64 = 5.0;

const WIDTH: f64 = 420.0;
const HEIGHT: f64 = 260.0;
const MARGIN: f64 = 30.0;
const RADAR_SIZE: f64 = 320.0;
const RADAR_RADIUS: f64 = 110.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartId {
    Bell,
    Buckets,
    Bucket(Bucket),
}

impl ChartId {
    pub fn all() -> impl Iterator<Item = ChartId> {
        [ChartId::Bell, ChartId::Buckets]
            .into_iter()
            .chain(Bucket::ALL.into_iter().map(ChartId::Bucket))
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bell => f.write_str("bell"),
            Self::Buckets => f.write_str("buckets"),
            Self::Bucket(b) => write!(f, "{b}"),
        }
    }
}

impl FromStr for ChartId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "bell" => return Ok(Self::Bell),
            "buckets" => return Ok(Self::Buckets),
            _ => {}
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Bucket::from_letter(letter.to_ascii_uppercase())
                .map(Self::Bucket)
                .ok_or_else(|| format!("unknown chart id: {s}")),
            _ => Err(format!("unknown chart id: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub id: ChartId,
    pub svg: String,
}

/// Owns the current chart for every id. Charts are swapped wholesale, never edited.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    charts: HashMap<ChartId, Chart>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `chart` under `id`, handing back whatever it displaced.
    pub fn replace(&mut self, id: ChartId, chart: Chart) -> Option<Chart> {
        let previous = self.charts.remove(&id);
        self.charts.insert(id, chart);
        previous
    }

    pub fn get(&self, id: ChartId) -> Option<&Chart> {
        self.charts.get(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.charts.len()
    }
}

/// Render every chart for `result` into `registry`.
pub fn render_all(result: &AggregateResult, rubric: &Rubric, registry: &mut ChartRegistry) {
    let bell = compute_bell(result.total_weighted);
    registry.replace(
        ChartId::Bell,
        Chart {
            id: ChartId::Bell,
            svg: generate_bell_svg(&bell),
        },
    );

    let overview: Vec<RadarPoint> = Bucket::ALL
        .iter()
        .map(|b| RadarPoint {
            label: b.letter().to_string(),
            value: result.buckets.get(*b),
        })
        .collect();
    registry.replace(
        ChartId::Buckets,
        Chart {
            id: ChartId::Buckets,
            svg: generate_radar_svg("Bucket overview", &overview, bucket_color(None)),
        },
    );

    let rows = sorted_rows(&result.per_criterion, rubric);
    for bucket in Bucket::ALL {
        let points: Vec<RadarPoint> = rows
            .iter()
            .filter(|r| r.bucket == Some(bucket))
            .map(|r| RadarPoint {
                label: r.name.clone(),
                value: plotted(r.score),
            })
            .collect();
        let id = ChartId::Bucket(bucket);
        registry.replace(
            id,
            Chart {
                id,
                svg: generate_radar_svg(bucket.title(), &points, bucket_color(Some(bucket))),
            },
        );
    }
}

/// Unknown scores sit at the radar centre.
fn plotted(score: Score) -> f64 {
    score.value().unwrap_or(0.0)
}

fn bucket_color(bucket: Option<Bucket>) -> &'static str {
    match bucket {
        Some(Bucket::P) | None => "rgb(0,188,212)",
        Some(Bucket::D) => "rgb(245,124,0)",
        Some(Bucket::S) => "rgb(255,235,59)",
        Some(Bucket::Y) => "rgb(76,175,80)",
        Some(Bucket::O) => "rgb(156,39,176)",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BellCurve {
    /// `(x, density)` for x in 20..=100.
    pub samples: Vec<(f64, f64)>,
    pub marker_index: usize,
    pub marker_height: f64,
}

fn gaussian(x: f64) -> f64 {
    let z = (x - BELL_MEAN) / BELL_SD;
    (-0.5 * z * z).exp() / (BELL_SD * (2.0 * PI).sqrt())
}

pub fn compute_bell(total: f64) -> BellCurve {
    let samples: Vec<(f64, f64)> = (BELL_X_MIN..=BELL_X_MAX)
        .map(|x| {
            let x = f64::from(x);
            (x, gaussian(x))
        })
        .collect();
    let peak = samples.iter().map(|(_, y)| *y).fold(0.0, f64::max);

    // First sample wins on ties.
    let mut marker_index = 0;
    let mut best = f64::INFINITY;
    for (i, (x, _)) in samples.iter().enumerate() {
        let distance = (x - total).abs();
        if distance < best {
            best = distance;
            marker_index = i;
        }
    }

    BellCurve {
        samples,
        marker_index,
        marker_height: peak * MARKER_HEIGHT_RATIO,
    }
}

pub fn generate_bell_svg(bell: &BellCurve) -> String {
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let x_span = f64::from(BELL_X_MAX - BELL_X_MIN);
    let y_max = if bell.marker_height > 0.0 {
        bell.marker_height
    } else {
        1.0
    };
    let sx = |x: f64| MARGIN + (x - f64::from(BELL_X_MIN)) / x_span * plot_w;
    let sy = |y: f64| HEIGHT - MARGIN - y / y_max * plot_h;

    let points: Vec<String> = bell
        .samples
        .iter()
        .map(|(x, y)| format!("{:.1},{:.1}", sx(*x), sy(*y)))
        .collect();

    let (marker_x, _) = bell.samples.get(bell.marker_index).copied().unwrap_or((0.0, 0.0));
    let bar_w = plot_w / x_span;
    let marker = format!(
        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="rgb(244,67,54)"/>"#,
        sx(marker_x) - bar_w / 2.0,
        sy(bell.marker_height),
        bar_w,
        bell.marker_height / y_max * plot_h,
    );

    let mut labels = String::new();
    for tick in (BELL_X_MIN..=BELL_X_MAX).step_by(20) {
        labels.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="10" text-anchor="middle">{tick}</text>"#,
            sx(f64::from(tick)),
            HEIGHT - MARGIN + 14.0,
        ));
    }

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">
<polyline fill="none" stroke="rgb(33,150,243)" stroke-width="2" points="{}"/>
{marker}
{labels}
</svg>"#,
        points.join(" "),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadarPoint {
    pub label: String,
    pub value: f64,
}

/// Vertex for spoke `i` of `n` at `value` on the 0..=5 radial scale.
pub fn radar_vertex(i: usize, n: usize, value: f64) -> (f64, f64) {
    let centre = RADAR_SIZE / 2.0;
    let angle = -PI / 2.0 + 2.0 * PI * i as f64 / n.max(1) as f64;
    let r = value.clamp(0.0, RADAR_SCALE_MAX) / RADAR_SCALE_MAX * RADAR_RADIUS;
    (centre + r * angle.cos(), centre + r * angle.sin())
}

pub fn generate_radar_svg(title: &str, points: &[RadarPoint], color: &str) -> String {
    let n = points.len();
    let size = RADAR_SIZE;
    if n == 0 {
        return format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}"><text x="10" y="20">{}</text></svg>"#,
            escape(title)
        );
    }

    let mut grid = String::new();
    for ring in 1..=RADAR_SCALE_MAX as usize {
        let ring_points: Vec<String> = (0..n)
            .map(|i| {
                let (x, y) = radar_vertex(i, n, ring as f64);
                format!("{x:.1},{y:.1}")
            })
            .collect();
        grid.push_str(&format!(
            r#"<polygon fill="none" stroke="rgb(220,220,220)" points="{}"/>"#,
            ring_points.join(" ")
        ));
    }

    let mut labels = String::new();
    for (i, point) in points.iter().enumerate() {
        let (x, y) = radar_vertex(i, n, RADAR_SCALE_MAX + 0.6);
        labels.push_str(&format!(
            r#"<text x="{x:.1}" y="{y:.1}" font-size="10" text-anchor="middle">{}</text>"#,
            escape(&point.label)
        ));
    }

    let shape: Vec<String> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (x, y) = radar_vertex(i, n, p.value);
            format!("{x:.1},{y:.1}")
        })
        .collect();

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">
<title>{}</title>
{grid}
<polygon fill="{color}" fill-opacity="0.25" stroke="{color}" stroke-width="2" points="{}"/>
{labels}
</svg>"#,
        escape(title),
        shape.join(" "),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    #[test]
    fn bell_spans_twenty_to_hundred() {
        let bell = compute_bell(60.0);
        assert_eq!(bell.samples.len(), 81);
        assert_eq!(bell.samples[0].0, 20.0);
        assert_eq!(bell.samples[80].0, 100.0);
        assert_eq!(bell.samples[bell.marker_index].0, 60.0);

        let peak = bell.samples[40].1;
        assert!((bell.marker_height - peak * 1.15).abs() < 1e-12);
    }

    #[test]
    fn bell_marker_picks_first_nearest_sample() {
        assert_eq!(compute_bell(72.5).samples[compute_bell(72.5).marker_index].0, 72.0);
        assert_eq!(compute_bell(5.0).marker_index, 0);
        assert_eq!(compute_bell(140.0).marker_index, 80);
    }

    #[test]
    fn radar_unknown_plots_at_centre() {
        let centre = RADAR_SIZE / 2.0;
        assert_eq!(radar_vertex(0, 4, 0.0), (centre, centre));
        let (x, y) = radar_vertex(0, 4, 5.0);
        assert!((x - centre).abs() < 1e-9);
        assert!((y - (centre - RADAR_RADIUS)).abs() < 1e-9);
    }

    #[test]
    fn chart_ids_parse_and_display() {
        assert_eq!("bell".parse::<ChartId>(), Ok(ChartId::Bell));
        assert_eq!("Buckets".parse::<ChartId>(), Ok(ChartId::Buckets));
        assert_eq!("s".parse::<ChartId>(), Ok(ChartId::Bucket(Bucket::S)));
        assert!("Q".parse::<ChartId>().is_err());
        assert!("PD".parse::<ChartId>().is_err());
        assert_eq!(ChartId::Bucket(Bucket::Y).to_string(), "Y");
        assert_eq!(ChartId::all().count(), 7);
    }

    #[test]
    fn replace_hands_back_previous_chart() {
        let mut registry = ChartRegistry::new();
        let first = Chart {
            id: ChartId::Bell,
            svg: "<svg>1</svg>".into(),
        };
        let second = Chart {
            id: ChartId::Bell,
            svg: "<svg>2</svg>".into(),
        };
        assert!(registry.replace(ChartId::Bell, first.clone()).is_none());
        assert_eq!(registry.replace(ChartId::Bell, second), Some(first));
        assert_eq!(registry.get(ChartId::Bell).unwrap().svg, "<svg>2</svg>");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn render_all_fills_every_chart_and_replaces_on_rerender() {
        let result = normalize(&json!({
            "per_criterion": { "P1": 4.0, "D5": { "score": 3.5, "name": "Jaw <line>" } }
        }));
        let mut registry = ChartRegistry::new();
        render_all(&result, &Rubric::unified(), &mut registry);
        assert_eq!(registry.len(), 7);
        for id in ChartId::all() {
            assert!(registry.get(id).unwrap().svg.starts_with("<svg"), "{id}");
        }
        assert!(registry
            .get(ChartId::Bucket(Bucket::D))
            .unwrap()
            .svg
            .contains("Jaw &lt;line&gt;"));

        let before = registry.get(ChartId::Bell).cloned();
        render_all(&normalize(&json!({})), &Rubric::unified(), &mut registry);
        assert_eq!(registry.len(), 7);
        assert_ne!(registry.get(ChartId::Bell).cloned(), before);
    }
}
