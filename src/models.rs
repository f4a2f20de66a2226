use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// European wheel red pockets
const RED_POCKETS: [u32; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

/// One observed game result. Never mutated once the store has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub value: u32,
    pub external_id: String,
    pub sequence_index: u64,
    pub received_at: DateTime<Utc>,
}

/// Unvalidated record coming from the feed or from manual ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    #[serde(alias = "number", alias = "result")]
    pub value: Option<i64>,
    #[serde(alias = "external_id", alias = "game_id")]
    pub id: String,
}

impl RawOutcome {
    pub fn new(value: i64, id: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            id: id.into(),
        }
    }
}

/// Inclusive bounds a value must fall into before it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u32,
    pub max: u32,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0, max: 36 }
    }
}

impl ValueRange {
    /// Returns the value as stored, or None when it is out of range.
    pub fn accept(&self, raw: Option<i64>) -> Option<u32> {
        let v = raw?;
        if v < self.min as i64 || v > self.max as i64 {
            return None;
        }
        Some(v as u32)
    }
}

/// Coarse bucket of an outcome value. Bucket 0 is always the zero pocket,
/// the remaining buckets are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Category(pub u8);

impl Category {
    pub const ZERO: Category = Category(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// How raw values are bucketed into categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryScheme {
    /// 0 is zero, `1..=threshold` is low, anything above is high
    HighLow { threshold: u32 },
    Dozen,
    Column,
    Parity,
    Color,
}

impl Default for CategoryScheme {
    fn default() -> Self {
        CategoryScheme::HighLow { threshold: 18 }
    }
}

impl CategoryScheme {
    /// Number of buckets including the zero bucket
    pub fn count(&self) -> usize {
        match self {
            CategoryScheme::Dozen | CategoryScheme::Column => 4,
            CategoryScheme::HighLow { .. } | CategoryScheme::Parity | CategoryScheme::Color => 3,
        }
    }

    pub fn categorize(&self, value: u32) -> Category {
        if value == 0 {
            return Category::ZERO;
        }
        let bucket = match self {
            CategoryScheme::HighLow { threshold } => {
                if value <= *threshold {
                    1
                } else {
                    2
                }
            }
            CategoryScheme::Dozen => ((value - 1) / 12 + 1).min(3),
            CategoryScheme::Column => (value - 1) % 3 + 1,
            CategoryScheme::Parity => {
                if value % 2 == 1 {
                    1
                } else {
                    2
                }
            }
            CategoryScheme::Color => {
                if RED_POCKETS.contains(&value) {
                    1
                } else {
                    2
                }
            }
        };
        Category(bucket as u8)
    }

    pub fn name(&self, category: Category) -> &'static str {
        const UNKNOWN: &str = "unknown";
        let names: &[&'static str] = match self {
            CategoryScheme::HighLow { .. } => &["zero", "low", "high"],
            CategoryScheme::Dozen => &["zero", "1st dozen", "2nd dozen", "3rd dozen"],
            CategoryScheme::Column => &["zero", "1st column", "2nd column", "3rd column"],
            CategoryScheme::Parity => &["zero", "odd", "even"],
            CategoryScheme::Color => &["zero", "red", "black"],
        };
        names.get(category.index()).copied().unwrap_or(UNKNOWN)
    }

    /// Buckets a heuristic is allowed to pick (everything but zero)
    pub fn non_zero(&self) -> impl Iterator<Item = Category> {
        (1..self.count() as u8).map(Category)
    }
}

/// Who produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Classifier,
    HotGroup,
    Trend,
    Alternation,
    Absent,
    Ensemble,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Classifier => "classifier",
            PredictionSource::HotGroup => "hot_group",
            PredictionSource::Trend => "trend",
            PredictionSource::Alternation => "alternation",
            PredictionSource::Absent => "absent",
            PredictionSource::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Category,
    /// Always within [0, 1]
    pub confidence: f64,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn new(label: Category, confidence: f64, source: PredictionSource) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

/// Every prediction produced in one cycle, made after observing the outcome
/// with index `made_at`. It may only be scored against `made_at + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub made_at: u64,
    pub predictions: BTreeMap<PredictionSource, Prediction>,
}

impl PredictionSet {
    pub fn new(made_at: u64) -> Self {
        Self {
            made_at,
            predictions: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, prediction: Prediction) {
        self.predictions.insert(prediction.source, prediction);
    }

    pub fn get(&self, source: PredictionSource) -> Option<&Prediction> {
        self.predictions.get(&source)
    }

    pub fn ensemble(&self) -> Option<&Prediction> {
        self.get(PredictionSource::Ensemble)
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Label-only fingerprint used to suppress repeated alerts.
    pub fn signature(&self) -> String {
        self.predictions
            .values()
            .map(|p| format!("{}={}", p.source, p.label.0))
            .collect::<Vec<_>>()
            .join(",")
    }
}
