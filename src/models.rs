use crate::aggregate::Aggregates;
use crate::error::{ErrorKind, JudgeError, JudgeResult};
use serde::Serialize;
use std::fmt;

/// Lowest score a judge may assign
pub const MIN_SCORE: i64 = 1;
/// Highest score a judge may assign
pub const MAX_SCORE: i64 = 5;

/// A support ticket paired with the response one model produced for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Example {
    pub id: String,
    pub ticket: String,
    pub response: String,
    /// Name of the model that produced `response`
    pub model: String,
    pub prompt_version: String,
}

/// Axis a response is scored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Relevance,
    Tone,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::Relevance, Dimension::Tone];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Relevance => "relevance",
            Dimension::Tone => "tone",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A judge's verdict on one dimension. Only values in 1..=5 can be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Score {
    score: u8,
    reasoning: String,
}

impl Score {
    pub fn new(score: i64, reasoning: impl Into<String>) -> JudgeResult<Self> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(JudgeError::Parse(format!(
                "score {} outside {}..={}",
                score, MIN_SCORE, MAX_SCORE
            )));
        }
        Ok(Self {
            score: score as u8,
            reasoning: reasoning.into(),
        })
    }

    pub fn value(&self) -> u8 {
        self.score
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }
}

/// Outcome of a fully scored example
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub id: String,
    pub model: String,
    pub prompt_version: String,
    pub relevance: Score,
    pub tone: Score,
}

impl EvaluationRecord {
    pub fn score(&self, dimension: Dimension) -> &Score {
        match dimension {
            Dimension::Relevance => &self.relevance,
            Dimension::Tone => &self.tone,
        }
    }
}

/// Last stage an example reached before it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    JudgeResolved,
    RelevanceScored,
    ToneScored,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::JudgeResolved => "judge_resolved",
            Stage::RelevanceScored => "relevance_scored",
            Stage::ToneScored => "tone_scored",
        };
        f.write_str(name)
    }
}

/// An input that produced no evaluation record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkippedEntry {
    /// Rejected by input validation
    Invalid { index: usize, reason: String },
    /// Valid input whose scoring failed
    Failed {
        id: String,
        stage: Stage,
        error_kind: ErrorKind,
        reason: String,
    },
}

impl SkippedEntry {
    pub fn reason(&self) -> &str {
        match self {
            SkippedEntry::Invalid { reason, .. } | SkippedEntry::Failed { reason, .. } => reason,
        }
    }
}

/// Everything handed to the report writer at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub results: Vec<EvaluationRecord>,
    pub skipped: Vec<SkippedEntry>,
    pub aggregates: Aggregates,
}

impl Report {
    pub fn failed_count(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s, SkippedEntry::Failed { .. }))
            .count()
    }
}
