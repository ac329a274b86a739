//! Usage accounting: per-request records and a bounded history of them

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default number of records kept before the oldest is evicted
pub const DEFAULT_USAGE_CAPACITY: usize = 1000;

/// Token and cost accounting for one completed request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total: usize,
    /// Estimated cost in USD, rounded to 4 decimal places
    pub cost: f64,
}

/// Price per 1K tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_1k: 0.001,
            output_per_1k: 0.002,
        }
    }
}

impl Pricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, prompt_tokens: usize, completion_tokens: usize) -> f64 {
        let input_cost = prompt_tokens as f64 * self.input_per_1k / 1000.0;
        let output_cost = completion_tokens as f64 * self.output_per_1k / 1000.0;
        round_cost(input_cost + output_cost)
    }
}

/// Round to 4 decimal places
pub fn round_cost(cost: f64) -> f64 {
    (cost * 10_000.0).round() / 10_000.0
}

impl UsageRecord {
    pub fn new(prompt_tokens: usize, completion_tokens: usize, pricing: Pricing) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total: prompt_tokens + completion_tokens,
            cost: pricing.cost(prompt_tokens, completion_tokens),
        }
    }
}

/// Aggregates over the records currently held
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub request_count: usize,
    pub total_tokens: usize,
    pub total_cost: f64,
    pub average_tokens_per_request: f64,
    pub prompt_total: usize,
    pub completion_total: usize,
}

impl std::fmt::Display for UsageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Usage Summary ===")?;
        writeln!(f, "Requests: {}", self.request_count)?;
        writeln!(f, "Prompt tokens: {}", self.prompt_total)?;
        writeln!(f, "Completion tokens: {}", self.completion_total)?;
        writeln!(f, "Total tokens: {}", self.total_tokens)?;
        writeln!(f, "Avg tokens/request: {:.1}", self.average_tokens_per_request)?;
        writeln!(f, "Estimated cost: ${:.4}", self.total_cost)?;
        Ok(())
    }
}

/// Thread-safe FIFO ring buffer of usage records
#[derive(Clone)]
pub struct UsageTracker {
    inner: Arc<Mutex<VecDeque<UsageRecord>>>,
    capacity: usize,
}

impl UsageTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn track(&self, record: UsageRecord) {
        let mut records = match self.inner.lock() {
            Ok(records) => records,
            Err(_) => {
                warn!(total = record.total, cost = record.cost, "Usage lock poisoned, record dropped");
                return;
            }
        };
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        debug!(
            total = record.total,
            cost = record.cost,
            held = records.len(),
            "Tracked usage"
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> UsageStats {
        let records = match self.inner.lock() {
            Ok(records) => records,
            Err(_) => return UsageStats::default(),
        };

        let request_count = records.len();
        let prompt_total: usize = records.iter().map(|r| r.prompt_tokens).sum();
        let completion_total: usize = records.iter().map(|r| r.completion_tokens).sum();
        let total_tokens: usize = records.iter().map(|r| r.total).sum();
        let total_cost = round_cost(records.iter().map(|r| r.cost).sum());

        UsageStats {
            request_count,
            total_tokens,
            total_cost,
            average_tokens_per_request: if request_count == 0 {
                0.0
            } else {
                total_tokens as f64 / request_count as f64
            },
            prompt_total,
            completion_total,
        }
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_CAPACITY)
    }
}
