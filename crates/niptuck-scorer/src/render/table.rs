use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::Serialize;

use crate::model::{CriterionResult, Score, TipRole, Tips};
use crate::rubric::{Bucket, Rubric};

/// One row of the criterion detail table.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct DetailRow {
    pub code: String,
    pub name: String,
    #[serde(skip)]
    #[schemars(skip)]
    pub bucket: Option<Bucket>,
    #[serde(skip)]
    #[schemars(skip)]
    pub score: Score,
    /// Two decimals, or a dash when unknown.
    pub score_text: String,
    /// Model rationale; empty when the model gave none.
    pub why: String,
    pub tips: Tips,
}

impl DetailRow {
    fn from_result(code: &str, result: &CriterionResult, rubric: &Rubric) -> Self {
        Self {
            code: code.to_string(),
            name: result
                .name
                .clone()
                .unwrap_or_else(|| rubric.friendly_name(code).to_string()),
            bucket: Bucket::from_code(code),
            score: result.score,
            score_text: result.score.display(),
            why: result.rationale.clone().unwrap_or_default(),
            tips: result.tips.clone(),
        }
    }

    /// Clipboard block for this row.
    pub fn copy_text(&self) -> String {
        let mut out = format!(
            "{} {}\nScore: {}\nWhy: {}",
            self.code, self.name, self.score_text, self.why
        );
        for role in TipRole::ALL {
            out.push_str(&format!("\n- {}: {}", role.label(), self.tips.display(role)));
        }
        out
    }
}

/// Bucket order P<D<S<Y<O, then lexical code. Codes with no bucket go last.
fn row_order(code: &str) -> (usize, &str) {
    let rank = Bucket::from_code(code)
        .map(Bucket::index)
        .unwrap_or(Bucket::ALL.len());
    (rank, code)
}

pub fn sorted_rows(
    criteria: &BTreeMap<String, CriterionResult>,
    rubric: &Rubric,
) -> Vec<DetailRow> {
    let mut codes: Vec<&String> = criteria.keys().collect();
    codes.sort_by(|a, b| row_order(a).cmp(&row_order(b)));
    codes
        .into_iter()
        .map(|code| DetailRow::from_result(code, &criteria[code], rubric))
        .collect()
}

/// Every row's clipboard block, separated by a blank line.
pub fn copy_all(rows: &[DetailRow]) -> String {
    rows.iter()
        .map(DetailRow::copy_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Which rows have their tip panel open.
#[derive(Debug, Default, Clone)]
pub struct TipsView {
    expanded: BTreeSet<String>,
}

impl TipsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one row. Returns the new state, or `None` for a code that is not in the table.
    pub fn toggle(&mut self, rows: &[DetailRow], code: &str) -> Option<bool> {
        if !rows.iter().any(|r| r.code == code) {
            return None;
        }
        if self.expanded.remove(code) {
            Some(false)
        } else {
            self.expanded.insert(code.to_string());
            Some(true)
        }
    }

    pub fn expand_all(&mut self, rows: &[DetailRow]) {
        self.expanded = rows.iter().map(|r| r.code.clone()).collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    pub fn is_expanded(&self, code: &str) -> bool {
        self.expanded.contains(code)
    }

    /// Expanded codes in table order.
    pub fn expanded_codes(&self, rows: &[DetailRow]) -> Vec<String> {
        rows.iter()
            .filter(|r| self.is_expanded(&r.code))
            .map(|r| r.code.clone())
            .collect()
    }
}
