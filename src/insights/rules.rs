// Rule-Based Fallback Classifier
//
// Ordered rule table evaluated top to bottom; the first matching rule wins.
// Earlier rules are stricter, the last rule matches everything. Each rule
// carries its own confidence formula with a fixed sub-range:
// - High Achiever       0.70-0.95
// - Struggling Learner  0.55-0.85
// - Reflective Learner  0.55-0.80
// - Fast Learner        0.55-0.80
// - Consistent Learner  0.50-0.75
// - Developing Learner  0.40-0.60
//
// Final confidence is clamped to [0.35, 0.95] and rounded to two decimals.

use crate::metrics::round2;
use crate::types::FeatureVector;
use serde::Serialize;

/// Lowest confidence the classifier ever reports
pub const MIN_CONFIDENCE: f64 = 0.35;

/// Highest confidence the classifier ever reports
pub const MAX_CONFIDENCE: f64 = 0.95;

/// One named entry of the rule table
pub struct Rule {
    pub label: &'static str,
    pub condition: fn(&FeatureVector) -> bool,
    pub confidence: fn(&FeatureVector) -> f64,
    pub explanation: fn(&FeatureVector) -> String,
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: &'static str,
    pub explanation: String,
    pub confidence: f64,
}

/// Clamp a threshold margin into [0, 1]
fn margin(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn avg(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

fn exam(f: &FeatureVector) -> f64 {
    f.avg_exam_score
}

fn hours(f: &FeatureVector) -> f64 {
    f.avg_completion_time_hours
}

fn days(f: &FeatureVector) -> f64 {
    f.total_active_days as f64
}

fn journeys(f: &FeatureVector) -> f64 {
    f.total_journeys_completed as f64
}

fn high_rejection(f: &FeatureVector) -> bool {
    f.total_submissions >= 5 && f.rejection_ratio() >= 0.40
}

fn low_exam(f: &FeatureVector) -> bool {
    f.total_journeys_completed >= 1 && exam(f) > 0.0 && exam(f) < 50.0
}

/// Non-zero signals among active days, journeys, submissions and exam score
fn active_signals(f: &FeatureVector) -> usize {
    [
        f.total_active_days > 0,
        f.total_journeys_completed > 0,
        f.total_submissions > 0,
        f.avg_exam_score > 0.0,
    ]
    .iter()
    .filter(|s| **s)
    .count()
}

/// The rule table, in evaluation order
pub static RULES: &[Rule] = &[
    Rule {
        label: "High Achiever",
        condition: |f| exam(f) >= 80.0 && f.total_journeys_completed >= 10,
        confidence: |f| {
            0.70 + 0.25 * avg(margin((exam(f) - 80.0) / 20.0), margin((journeys(f) - 10.0) / 20.0))
        },
        explanation: |f| {
            format!(
                "Averages {:.1} on exams across {} completed journeys.",
                exam(f),
                f.total_journeys_completed
            )
        },
    },
    Rule {
        label: "Struggling Learner",
        condition: |f| high_rejection(f) || low_exam(f),
        confidence: |f| {
            let rejection = if high_rejection(f) {
                margin((f.rejection_ratio() - 0.40) / 0.60)
            } else {
                0.0
            };
            let scores = if low_exam(f) {
                margin((50.0 - exam(f)) / 50.0)
            } else {
                0.0
            };
            0.55 + 0.30 * rejection.max(scores)
        },
        explanation: |f| {
            if high_rejection(f) {
                format!(
                    "{} of {} submissions were rejected ({:.0}%).",
                    f.rejected_submissions,
                    f.total_submissions,
                    f.rejection_ratio() * 100.0
                )
            } else {
                format!(
                    "Exam average of {:.1} is below 50 after {} journeys.",
                    exam(f),
                    f.total_journeys_completed
                )
            }
        },
    },
    Rule {
        label: "Reflective Learner",
        condition: |f| hours(f) >= 5.0 && f.total_active_days >= 20,
        confidence: |f| {
            0.55 + 0.25 * avg(margin((hours(f) - 5.0) / 10.0), margin((days(f) - 20.0) / 80.0))
        },
        explanation: |f| {
            format!(
                "Spends {:.1} hours per journey over {} active days.",
                hours(f),
                f.total_active_days
            )
        },
    },
    Rule {
        label: "Fast Learner",
        condition: |f| {
            hours(f) > 0.0 && hours(f) <= 2.0 && f.total_journeys_completed >= 3 && exam(f) >= 65.0
        },
        confidence: |f| {
            0.55 + 0.25 * avg(margin((2.0 - hours(f)) / 2.0), margin((exam(f) - 65.0) / 35.0))
        },
        explanation: |f| {
            format!(
                "Completes journeys in {:.1} hours on average while scoring {:.1}.",
                hours(f),
                exam(f)
            )
        },
    },
    Rule {
        label: "Consistent Learner",
        condition: |f| f.total_active_days >= 15 && f.total_journeys_completed >= 5,
        confidence: |f| {
            0.50 + 0.25 * avg(margin((days(f) - 15.0) / 85.0), margin((journeys(f) - 5.0) / 15.0))
        },
        explanation: |f| {
            format!(
                "Active on {} days with {} journeys completed.",
                f.total_active_days, f.total_journeys_completed
            )
        },
    },
    Rule {
        label: "Developing Learner",
        condition: |_| true,
        confidence: |f| 0.40 + 0.05 * active_signals(f) as f64,
        explanation: |f| match active_signals(f) {
            0 => "No active data points yet; keep learning to unlock a clearer profile.".to_string(),
            n => format!(
                "Early activity across {} of 4 tracked signals; more data will sharpen this profile.",
                n
            ),
        },
    },
];

/// Classify a feature vector with the first matching rule
pub fn classify(features: &FeatureVector) -> Classification {
    let rule = RULES
        .iter()
        .find(|rule| (rule.condition)(features))
        .unwrap_or(&RULES[RULES.len() - 1]);

    let confidence = round2((rule.confidence)(features).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE));

    Classification {
        label: rule.label,
        explanation: (rule.explanation)(features),
        confidence,
    }
}
