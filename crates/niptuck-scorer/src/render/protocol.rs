use schemars::JsonSchema;
use serde::Serialize;

use crate::model::{Protocol, NO_DATA};

pub const DATA_NEEDED_NOTE: &str =
    "We down-weighted dynamics. Add a 5-10s neutral→smile clip to refine Y-scores.";

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ProtocolPhase {
    pub label: String,
    pub steps: Vec<String>,
}

pub fn phases(protocol: &Protocol) -> Vec<ProtocolPhase> {
    protocol
        .phases()
        .into_iter()
        .map(|(label, steps)| ProtocolPhase {
            label: label.to_string(),
            steps: steps.to_vec(),
        })
        .collect()
}

/// Phase label followed by its steps as bullets; phases separated by a blank line.
pub fn copy_protocol(protocol: &Protocol) -> String {
    protocol
        .phases()
        .into_iter()
        .map(|(label, steps)| {
            let mut block = label.to_string();
            if steps.is_empty() {
                block.push_str(&format!("\n- {NO_DATA}"));
            }
            for step in steps {
                block.push_str(&format!("\n- {step}"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn data_needed_note(data_needed: &[String]) -> Option<&'static str> {
    (!data_needed.is_empty()).then_some(DATA_NEEDED_NOTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> Protocol {
        Protocol {
            weeks_1_4: vec!["SPF 50 daily".into(), "Retinoid 3x/week".into()],
            weeks_5_8: vec![],
            weeks_9_12: vec!["Consult on chin filler".into()],
        }
    }

    #[test]
    fn phases_keep_order_and_labels() {
        let phases = phases(&protocol());
        let labels: Vec<&str> = phases.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["Weeks 1-4", "Weeks 5-8", "Weeks 9-12"]);
        assert_eq!(phases[0].steps[1], "Retinoid 3x/week");
    }

    #[test]
    fn copy_protocol_text() {
        assert_eq!(
            copy_protocol(&protocol()),
            "Weeks 1-4\n- SPF 50 daily\n- Retinoid 3x/week\n\nWeeks 5-8\n- —\n\nWeeks 9-12\n- Consult on chin filler"
        );
    }

    #[test]
    fn note_only_when_data_needed() {
        assert_eq!(data_needed_note(&[]), None);
        assert_eq!(
            data_needed_note(&["smile_clip".to_string()]),
            Some(DATA_NEEDED_NOTE)
        );
    }
}
