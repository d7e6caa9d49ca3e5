use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::models::{Dimension, EvaluationRecord};

/// Running statistics for one dimension within a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionStats {
    pub count: u64,
    #[serde(serialize_with = "round_two_places")]
    pub mean: f64,
    pub min: u8,
    pub max: u8,
}

fn round_two_places<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

impl DimensionStats {
    fn first(value: u8) -> Self {
        Self {
            count: 1,
            mean: f64::from(value),
            min: value,
            max: value,
        }
    }

    fn update(&mut self, value: u8) {
        self.count += 1;
        self.mean += (f64::from(value) - self.mean) / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Statistics for every record sharing a group key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub count: u64,
    pub relevance: DimensionStats,
    pub tone: DimensionStats,
}

impl GroupStats {
    fn first(record: &EvaluationRecord) -> Self {
        Self {
            count: 1,
            relevance: DimensionStats::first(record.relevance.value()),
            tone: DimensionStats::first(record.tone.value()),
        }
    }

    fn update(&mut self, record: &EvaluationRecord) {
        self.count += 1;
        self.relevance.update(record.relevance.value());
        self.tone.update(record.tone.value());
    }

    pub fn dimension(&self, dimension: Dimension) -> &DimensionStats {
        match dimension {
            Dimension::Relevance => &self.relevance,
            Dimension::Tone => &self.tone,
        }
    }
}

/// The three bucket families reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregates {
    pub by_model: BTreeMap<String, GroupStats>,
    pub by_prompt_version: BTreeMap<String, GroupStats>,
    pub by_model_and_prompt_version: BTreeMap<String, GroupStats>,
}

/// Key for the combined model/prompt-version bucket
pub fn composite_key(model: &str, prompt_version: &str) -> String {
    format!("{}|{}", model, prompt_version)
}

fn update_bucket(buckets: &mut BTreeMap<String, GroupStats>, key: &str, record: &EvaluationRecord) {
    match buckets.get_mut(key) {
        Some(stats) => stats.update(record),
        None => {
            buckets.insert(key.to_string(), GroupStats::first(record));
        }
    }
}

/// Incremental fold of evaluation records into grouped statistics
#[derive(Debug, Default)]
pub struct Aggregator {
    aggregates: Aggregates,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> Self {
        let mut aggregator = Self::new();
        for record in records {
            aggregator.update(record);
        }
        aggregator
    }

    /// Add one record to its bucket in each family
    pub fn update(&mut self, record: &EvaluationRecord) {
        let aggregates = &mut self.aggregates;
        update_bucket(&mut aggregates.by_model, &record.model, record);
        update_bucket(&mut aggregates.by_prompt_version, &record.prompt_version, record);
        update_bucket(
            &mut aggregates.by_model_and_prompt_version,
            &composite_key(&record.model, &record.prompt_version),
            record,
        );
    }

    pub fn into_aggregates(self) -> Aggregates {
        self.aggregates
    }
}
