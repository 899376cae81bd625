//! Task-to-model recommendation.
//!
//! A static table scores each Google model on speed, quality and cost; each
//! CRM task type carries a priority and a complexity. The recommender weights
//! the scores by the task's priority and drops models that cannot handle the
//! task's complexity. Everything here is pure and synchronous.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Speed,
    Quality,
    Cost,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    EmailGeneration,
    EmailAnalysis,
    ContactScoring,
    Categorization,
    ContactEnrichment,
    LeadQualification,
    SalesForecasting,
    ContentCreation,
    MarketAnalysis,
    MeetingSummarization,
    BusinessAnalysis,
}

#[derive(Debug, Error)]
#[error("Unknown task type: {0}")]
pub struct UnknownTask(pub String);

impl TaskType {
    pub const ALL: [TaskType; 11] = [
        TaskType::EmailGeneration,
        TaskType::EmailAnalysis,
        TaskType::ContactScoring,
        TaskType::Categorization,
        TaskType::ContactEnrichment,
        TaskType::LeadQualification,
        TaskType::SalesForecasting,
        TaskType::ContentCreation,
        TaskType::MarketAnalysis,
        TaskType::MeetingSummarization,
        TaskType::BusinessAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailGeneration => "email_generation",
            Self::EmailAnalysis => "email_analysis",
            Self::ContactScoring => "contact_scoring",
            Self::Categorization => "categorization",
            Self::ContactEnrichment => "contact_enrichment",
            Self::LeadQualification => "lead_qualification",
            Self::SalesForecasting => "sales_forecasting",
            Self::ContentCreation => "content_creation",
            Self::MarketAnalysis => "market_analysis",
            Self::MeetingSummarization => "meeting_summarization",
            Self::BusinessAnalysis => "business_analysis",
        }
    }

    pub fn profile(self) -> TaskProfile {
        let (name, priority, complexity) = match self {
            Self::EmailGeneration => ("Email Generation", Priority::Balanced, Complexity::Medium),
            Self::EmailAnalysis => ("Email Analysis", Priority::Quality, Complexity::Medium),
            Self::ContactScoring => ("Contact Scoring", Priority::Speed, Complexity::Low),
            Self::Categorization => ("Categorization", Priority::Speed, Complexity::Low),
            Self::ContactEnrichment => ("Contact Enrichment", Priority::Quality, Complexity::Medium),
            Self::LeadQualification => ("Lead Qualification", Priority::Balanced, Complexity::Medium),
            Self::SalesForecasting => ("Sales Forecasting", Priority::Quality, Complexity::High),
            Self::ContentCreation => ("Content Creation", Priority::Quality, Complexity::High),
            Self::MarketAnalysis => ("Market Analysis", Priority::Quality, Complexity::High),
            Self::MeetingSummarization => ("Meeting Summarization", Priority::Balanced, Complexity::Medium),
            Self::BusinessAnalysis => ("Business Analysis", Priority::Quality, Complexity::High),
        };
        TaskProfile {
            name,
            priority,
            complexity,
        }
    }
}

impl FromStr for TaskType {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTask(s.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProfile {
    pub name: &'static str,
    pub priority: Priority,
    pub complexity: Complexity,
}

/// Static performance profile. `cost` is higher-is-more-expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPerformance {
    pub id: &'static str,
    pub quality: u8,
    pub speed: u8,
    pub cost: u8,
    pub complexity: &'static [Complexity],
}

pub const MODEL_PERFORMANCE: &[ModelPerformance] = &[
    ModelPerformance {
        id: "gemini-2.5-flash",
        quality: 90,
        speed: 75,
        cost: 60,
        complexity: &[Complexity::Medium, Complexity::High],
    },
    ModelPerformance {
        id: "gemini-2.5-flash-8b",
        quality: 82,
        speed: 85,
        cost: 30,
        complexity: &[Complexity::Low, Complexity::Medium],
    },
    ModelPerformance {
        id: "gemma-2-27b-it",
        quality: 88,
        speed: 70,
        cost: 45,
        complexity: &[Complexity::Medium, Complexity::High],
    },
    ModelPerformance {
        id: "gemma-2-9b-it",
        quality: 85,
        speed: 80,
        cost: 20,
        complexity: &[Complexity::Low, Complexity::Medium, Complexity::High],
    },
    ModelPerformance {
        id: "gemma-2-2b-it",
        quality: 75,
        speed: 95,
        cost: 10,
        complexity: &[Complexity::Low, Complexity::Medium],
    },
];

fn performance(model: &str) -> Option<&'static ModelPerformance> {
    MODEL_PERFORMANCE.iter().find(|m| m.id == model)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecommendation {
    pub model_id: String,
    pub model_name: String,
    pub provider: String,
    pub confidence: f64,
    pub reason: String,
    pub cost_efficiency: u8,
    pub speed: u8,
    pub quality: u8,
}

impl ModelRecommendation {
    fn default_choice() -> Self {
        Self {
            model_id: "gemini-2.5-flash".to_owned(),
            model_name: "Gemini 2.5 Flash".to_owned(),
            provider: "Google".to_owned(),
            confidence: 0.6,
            reason: "Default model selected as no optimal match was found for this task.".to_owned(),
            cost_efficiency: 60,
            speed: 75,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suitability {
    pub suitable: bool,
    pub confidence: f64,
    pub reason: String,
}

/// Every model in the table is a Google model.
fn provider_matches(preferred: Option<&str>) -> bool {
    match preferred {
        None => true,
        Some(p) => p.eq_ignore_ascii_case("google") || p.eq_ignore_ascii_case("gemini"),
    }
}

fn weighted_score(model: &ModelPerformance, priority: Priority) -> f64 {
    let (speed, quality, cost) = match priority {
        Priority::Speed => (0.6, 0.2, 0.2),
        Priority::Quality => (0.2, 0.6, 0.2),
        Priority::Cost => (0.2, 0.2, 0.6),
        Priority::Balanced => (0.3, 0.4, 0.3),
    };
    let total = f64::from(model.speed) * speed
        + f64::from(model.quality) * quality
        + f64::from(100 - model.cost) * cost;
    total / (speed + quality + cost)
}

/// `gemma-2-9b-it` → `Gemma 2 9b Instruction-tuned`.
fn display_name(model_id: &str) -> String {
    model_id
        .split('-')
        .map(|part| {
            if part == "it" {
                return "Instruction-tuned".to_owned();
            }
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn provider_name(model_id: &str) -> &'static str {
    if model_id.contains("gemma") {
        "Google Gemma"
    } else if model_id.contains("gemini") {
        "Google Gemini"
    } else {
        "OpenAI"
    }
}

/// Best model for `task`. Ties keep table order. Falls back to the default
/// model when nothing scores above zero.
pub fn recommend(task: TaskType, preferred_provider: Option<&str>) -> ModelRecommendation {
    let profile = task.profile();

    let mut best: Option<(&ModelPerformance, f64)> = None;
    for model in MODEL_PERFORMANCE {
        let score = if !provider_matches(preferred_provider) || !model.complexity.contains(&profile.complexity) {
            0.0
        } else {
            weighted_score(model, profile.priority)
        };
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((model, score));
        }
    }

    let Some((model, score)) = best.filter(|(_, score)| *score > 0.0) else {
        return ModelRecommendation::default_choice();
    };

    let task_name = profile.name.to_lowercase();
    let reason = match profile.priority {
        Priority::Speed => format!(
            "Selected for its excellent processing speed ({}/100) while maintaining adequate quality for {task_name}.",
            model.speed
        ),
        Priority::Quality => format!(
            "Selected for its high-quality outputs ({}/100) that meet the precision requirements for {task_name}.",
            model.quality
        ),
        Priority::Cost => {
            format!("Selected for optimal cost efficiency while providing adequate performance for {task_name}.")
        }
        Priority::Balanced => format!("Provides a good balance of speed, quality, and cost for {task_name}."),
    };

    ModelRecommendation {
        model_id: model.id.to_owned(),
        model_name: display_name(model.id),
        provider: provider_name(model.id).to_owned(),
        confidence: score / 100.0,
        reason,
        cost_efficiency: 100 - model.cost,
        speed: model.speed,
        quality: model.quality,
    }
}

pub fn all_recommendations() -> BTreeMap<TaskType, ModelRecommendation> {
    TaskType::ALL
        .into_iter()
        .map(|task| (task, recommend(task, None)))
        .collect()
}

/// How well `model` fits `task`, judged on the task's priority alone.
pub fn model_suitability(model: &str, task: &str) -> Suitability {
    let (Some(perf), Ok(task)) = (performance(model), task.parse::<TaskType>()) else {
        return Suitability {
            suitable: false,
            confidence: 0.0,
            reason: "Invalid task type or model ID.".to_owned(),
        };
    };
    let profile = task.profile();

    if !perf.complexity.contains(&profile.complexity) {
        return Suitability {
            suitable: false,
            confidence: 0.2,
            reason: format!("This model is not well-suited for {} complexity tasks.", profile.complexity),
        };
    }

    let (score, reason) = match profile.priority {
        Priority::Speed => (
            f64::from(perf.speed) / 100.0,
            if perf.speed > 80 {
                "This model is well-suited for speed-prioritized tasks."
            } else {
                "This model may not be fast enough for this speed-critical task."
            },
        ),
        Priority::Quality => (
            f64::from(perf.quality) / 100.0,
            if perf.quality > 80 {
                "This model is well-suited for quality-prioritized tasks."
            } else {
                "This model may not produce high enough quality for this task."
            },
        ),
        Priority::Cost => (
            f64::from(100 - perf.cost) / 100.0,
            if perf.cost < 30 {
                "This model is cost-effective for this task."
            } else {
                "There may be more cost-effective options for this task."
            },
        ),
        Priority::Balanced => {
            let score = f64::from(u16::from(perf.speed) + u16::from(perf.quality) + u16::from(100 - perf.cost))
                / 3.0
                / 100.0;
            (
                score,
                if score > 0.7 {
                    "This model provides a good balance for this task."
                } else {
                    "This model may not provide the best balance for this task."
                },
            )
        }
    };

    Suitability {
        suitable: score > 0.6,
        confidence: score,
        reason: reason.to_owned(),
    }
}
