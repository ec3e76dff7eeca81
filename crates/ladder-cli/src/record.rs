//! Output records, one JSON object per line.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use ladder_runtime::PipelineAnswer;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Record {
    Answered {
        id: String,
        prompt: String,
        answer: String,
        candidate: String,
        confidence: f64,
        resolution: &'static str,
        answered_at: DateTime<Utc>,
    },
    Failed {
        id: String,
        prompt: String,
        error: String,
        answered_at: DateTime<Utc>,
    },
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Record {
    pub fn answered(prompt: &str, answer: &PipelineAnswer) -> Self {
        let outcome = &answer.outcome;
        Record::Answered {
            id: new_id(),
            prompt: prompt.to_string(),
            answer: outcome.answer.clone(),
            candidate: outcome.resolution.candidate().to_string(),
            confidence: outcome.resolution.confidence(),
            resolution: outcome.resolution.kind(),
            answered_at: outcome.finished_at,
        }
    }

    pub fn failed(prompt: &str, error: &dyn std::error::Error) -> Self {
        Record::Failed {
            id: new_id(),
            prompt: prompt.to_string(),
            error: error.to_string(),
            answered_at: Utc::now(),
        }
    }
}
