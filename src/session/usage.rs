//! Token usage summaries and cost estimates

use super::state::{Model, TokenUsage};
use chrono::{DateTime, Utc};
use std::fmt;

/// Approximate bytes per token for usage estimation
const APPROX_BYTES_PER_TOKEN: usize = 4;

/// USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn cost(&self, input: u64, output: u64) -> f64 {
        (input as f64 * self.input_per_million + output as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

pub fn pricing(model: Model) -> ModelPricing {
    match model {
        Model::TierA => ModelPricing {
            input_per_million: 15.0,
            output_per_million: 75.0,
        },
        Model::TierB => ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        },
        Model::TierC => ModelPricing {
            input_per_million: 0.8,
            output_per_million: 4.0,
        },
    }
}

/// Estimate tokens for text the engine did not meter for us
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(APPROX_BYTES_PER_TOKEN) as u64
}

/// Derived view over [`TokenUsage`]. Costs use the current model's prices.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUsageSummary {
    pub model: Model,
    pub session_input: u64,
    pub session_output: u64,
    pub total_input: u64,
    pub total_output: u64,
    pub session_cost: f64,
    pub total_cost: f64,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl TokenUsageSummary {
    pub fn from_usage(model: Model, usage: &TokenUsage) -> Self {
        let prices = pricing(model);
        Self {
            model,
            session_input: usage.session_input,
            session_output: usage.session_output,
            total_input: usage.total_input,
            total_output: usage.total_output,
            session_cost: prices.cost(usage.session_input, usage.session_output),
            total_cost: prices.cost(usage.total_input, usage.total_output),
            last_updated_at: usage.last_updated_at,
        }
    }

    pub fn session_total(&self) -> u64 {
        self.session_input + self.session_output
    }

    pub fn lifetime_total(&self) -> u64 {
        self.total_input + self.total_output
    }
}

impl fmt::Display for TokenUsageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Token usage ({})", self.model)?;
        writeln!(
            f,
            "Session: {} in / {} out ({} total) ~${:.4}",
            self.session_input,
            self.session_output,
            self.session_total(),
            self.session_cost
        )?;
        write!(
            f,
            "Lifetime: {} in / {} out ({} total) ~${:.4}",
            self.total_input,
            self.total_output,
            self.lifetime_total(),
            self.total_cost
        )?;
        if let Some(at) = self.last_updated_at {
            write!(f, "\nUpdated: {}", at.format("%Y-%m-%d %H:%M UTC"))?;
        }
        Ok(())
    }
}
