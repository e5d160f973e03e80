//! Optimizer trace: what each rule rewrote, and why.
//!
//! Action and reason texts are part of the observable output; tooling matches
//! them literally.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub action: String,
    pub reason: String,
}

impl TraceStep {
    pub fn new(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_name: String,
    pub steps: Vec<TraceStep>,
}

/// Per-invocation trace: one entry per rule that rewrote something, in the
/// order the rules ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeTrace {
    pub rules: Vec<RuleTrace>,
}

impl OptimizeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First entry for `rule_name`.
    pub fn rule(&self, rule_name: &str) -> Option<&RuleTrace> {
        self.rules.iter().find(|r| r.rule_name == rule_name)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule_name.as_str()).collect()
    }

    pub fn total_steps(&self) -> usize {
        self.rules.iter().map(|r| r.steps.len()).sum()
    }

    pub(crate) fn append(&mut self, rule_name: &str, steps: Vec<TraceStep>) {
        if steps.is_empty() {
            return;
        }
        self.rules.push(RuleTrace {
            rule_name: rule_name.to_string(),
            steps,
        });
    }

    pub fn to_json(&self) -> qopt_core::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable listing, one block per rule.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&format!("{}:\n", rule.rule_name));
            for (i, step) in rule.steps.iter().enumerate() {
                out.push_str(&format!("  {}. action: {}\n", i + 1, step.action));
                if !step.reason.is_empty() {
                    out.push_str(&format!("     reason: {}\n", step.reason));
                }
            }
        }
        out
    }
}
