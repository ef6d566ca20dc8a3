use std::fmt;

use serde::Serialize;

/// One of the five criterion groups, identified by the first character of a criterion code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Bucket {
    P,
    D,
    S,
    Y,
    O,
}

impl Bucket {
    /// Display and sort order.
    pub const ALL: [Bucket; 5] = [Bucket::P, Bucket::D, Bucket::S, Bucket::Y, Bucket::O];

    pub fn from_code(code: &str) -> Option<Self> {
        code.chars().next().and_then(Self::from_letter)
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'P' => Some(Self::P),
            'D' => Some(Self::D),
            'S' => Some(Self::S),
            'Y' => Some(Self::Y),
            'O' => Some(Self::O),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::P => 'P',
            Self::D => 'D',
            Self::S => 'S',
            Self::Y => 'Y',
            Self::O => 'O',
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::P => "Proportions",
            Self::D => "Definition",
            Self::S => "Skin",
            Self::Y => "Dynamics",
            Self::O => "Overall presentation",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub code: &'static str,
    pub name: &'static str,
}

impl Criterion {
    pub fn bucket(&self) -> Bucket {
        // Every code in CRITERIA starts with a bucket letter.
        Bucket::from_code(self.code).unwrap_or(Bucket::O)
    }
}

const fn c(code: &'static str, name: &'static str) -> Criterion {
    Criterion { code, name }
}

/// The unified 20-criterion rubric, in the order it is sent to the model.
pub static CRITERIA: [Criterion; 20] = [
    c("P1", "Facial thirds balance"),
    c("P2", "Facial fifths / width"),
    c("P3", "Midface proportion"),
    c("P4", "Feature spacing harmony"),
    c("D5", "Jawline definition"),
    c("D6", "Chin projection/width"),
    c("D7", "Cheekbone prominence"),
    c("D8", "Brow & supraorbital"),
    c("S10", "Skin texture / pores"),
    c("S11", "Pigmentation / tone even"),
    c("S12", "Under-eye quality"),
    c("S9", "Skin clarity (acne/redness)"),
    c("Y13", "Gaze engagement"),
    c("Y14", "Micro-expression control"),
    c("Y15", "Head/neck posture line"),
    c("Y16", "Smile harmony (tooth/lip)"),
    c("O17", "Photographic framing"),
    c("O18", "Lighting suitability"),
    c("O19", "Grooming/styling fit"),
    c("O20", "Overall facial harmony"),
];

/// Read-only view over the fixed criteria.
#[derive(Debug, Clone, Copy)]
pub struct Rubric {
    criteria: &'static [Criterion],
}

impl Default for Rubric {
    fn default() -> Self {
        Self::unified()
    }
}

impl Rubric {
    pub fn unified() -> Self {
        Self {
            criteria: &CRITERIA,
        }
    }

    pub fn criteria(&self) -> &'static [Criterion] {
        self.criteria
    }

    pub fn get(&self, code: &str) -> Option<&'static Criterion> {
        self.criteria.iter().find(|c| c.code == code)
    }

    /// Friendly name for a code, or the code itself when it is not in the rubric.
    pub fn friendly_name<'a>(&self, code: &'a str) -> &'a str {
        match self.get(code) {
            Some(c) => c.name,
            None => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_criteria_four_per_bucket() {
        let rubric = Rubric::unified();
        assert_eq!(rubric.criteria().len(), 20);
        for bucket in Bucket::ALL {
            let count = rubric
                .criteria()
                .iter()
                .filter(|c| c.bucket() == bucket)
                .count();
            assert_eq!(count, 4, "bucket {bucket}");
        }
    }

    #[test]
    fn codes_are_unique_and_prefixed_by_bucket() {
        let rubric = Rubric::unified();
        let mut codes: Vec<&str> = rubric.criteria().iter().map(|c| c.code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 20);
        assert!(rubric
            .criteria()
            .iter()
            .all(|c| Bucket::from_code(c.code).is_some()));
    }

    #[test]
    fn friendly_name_falls_back_to_code() {
        let rubric = Rubric::unified();
        assert_eq!(rubric.friendly_name("S9"), "Skin clarity (acne/redness)");
        assert_eq!(rubric.friendly_name("Z99"), "Z99");
    }

    #[test]
    fn bucket_letters_round_trip() {
        for bucket in Bucket::ALL {
            assert_eq!(Bucket::from_letter(bucket.letter()), Some(bucket));
        }
        assert_eq!(Bucket::from_code("x1"), None);
        assert_eq!(Bucket::from_code(""), None);
        assert_eq!(Bucket::S.index(), 2);
    }
}
