//! Next-experiment suggestions
//!
//! Rules are pure functions over what has been tried so far, evaluated in a
//! fixed order. Every rule that fires contributes one suggestion; when none
//! fires a generic fallback is returned.

use indexmap::IndexMap;
use lab_core::{ExperimentResult, ExperimentStatus};
use serde::Serialize;

/// Blocked records tolerated before stability work is suggested
pub const BLOCKED_THRESHOLD: usize = 3;

/// A proposed experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Proposed experiment id
    pub id: String,
    /// Why it is worth trying
    pub rationale: String,
}

impl Suggestion {
    fn new(id: &str, rationale: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            rationale: rationale.into(),
        }
    }
}

/// Inputs of the suggestion rules
#[derive(Debug, Clone, Copy)]
pub struct SuggestionContext<'a> {
    /// Latest record per id
    pub latest: &'a IndexMap<&'a str, &'a ExperimentResult>,
    /// Raw history
    pub history: &'a [ExperimentResult],
}

impl SuggestionContext<'_> {
    /// True when some tried id contains `needle`
    #[must_use]
    pub fn tried(&self, needle: &str) -> bool {
        self.latest.keys().any(|id| id.contains(needle))
    }

    /// Passing experiment with the lowest rtt average
    #[must_use]
    pub fn best_passing_rtt(&self) -> Option<(&str, f64)> {
        self.latest
            .iter()
            .filter(|(_, r)| r.status() == ExperimentStatus::Passed)
            .filter_map(|(id, r)| r.metrics().average("rtt_avg_ms").map(|v| (*id, v)))
            .fold(None, |best: Option<(&str, f64)>, (id, v)| match best {
                Some((_, b)) if b <= v => best,
                _ => Some((id, v)),
            })
    }

    /// Blocked records across the raw history
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.history
            .iter()
            .filter(|e| e.status() == ExperimentStatus::Blocked)
            .count()
    }
}

type Rule = fn(&SuggestionContext<'_>) -> Option<Suggestion>;

const RULES: &[Rule] = &[
    policy_balanced,
    policy_nosharpen,
    gl_shader_blit,
    adaptive_backpressure,
    fix_build_stability,
];

fn policy_balanced(ctx: &SuggestionContext<'_>) -> Option<Suggestion> {
    let (id, rtt) = ctx.best_passing_rtt()?;
    (id.contains("comfortable") && !ctx.tried("balanced")).then(|| {
        Suggestion::new(
            "policy-balanced",
            format!(
                "Best result so far is {id} (RTT {rtt:.1}ms). Try balanced (1280x960) as middle ground."
            ),
        )
    })
}

fn policy_nosharpen(ctx: &SuggestionContext<'_>) -> Option<Suggestion> {
    (ctx.tried("sharpen") && !ctx.tried("nosharpen")).then(|| {
        Suggestion::new(
            "policy-nosharpen",
            "Sharpening variants tried but zero-sharpen not yet tested. Eliminates the convolution pass entirely.",
        )
    })
}

fn gl_shader_blit(ctx: &SuggestionContext<'_>) -> Option<Suggestion> {
    (!ctx.tried("gl")).then(|| {
        Suggestion::new(
            "gl-shader-blit",
            "GL shader blit path not yet attempted. Largest expected single-optimization gain (~5ms).",
        )
    })
}

fn adaptive_backpressure(ctx: &SuggestionContext<'_>) -> Option<Suggestion> {
    (!ctx.tried("backpressure") && !ctx.tried("adaptive")).then(|| {
        Suggestion::new(
            "adaptive-backpressure",
            "Adaptive backpressure (RTT-aware threshold) not yet tested. Low risk, moderate expected gain.",
        )
    })
}

fn fix_build_stability(ctx: &SuggestionContext<'_>) -> Option<Suggestion> {
    let blocked = ctx.blocked_count();
    (blocked > BLOCKED_THRESHOLD).then(|| {
        Suggestion::new(
            "fix-build-stability",
            format!(
                "{blocked} blocked experiments detected. Investigate build/setup reliability before more experiments."
            ),
        )
    })
}

/// Run every rule in order
#[must_use]
pub fn suggest_next(ctx: &SuggestionContext<'_>) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = RULES.iter().filter_map(|rule| rule(ctx)).collect();
    if suggestions.is_empty() {
        suggestions.push(Suggestion::new(
            "custom",
            "All standard suggestions exhausted. Review the ledger and define a custom experiment.",
        ));
    }
    suggestions
}
