//! Risk evaluator: maps one snapshot to one assessment.
//!
//! RULE ORDER (fixed, documented, never reordered):
//!   1. Income
//!   2. Withdrawal
//!   3. Spending pressure
//!   4. Survival mode
//!   5. Velocity
//!   6. Dormancy (reasons only)
//!
//! RULES:
//!   - Every rule adds to the score; none subtracts.
//!   - Hardship and action are first-match-wins. Only the severe
//!     spending-pressure branch overrides a hardship already set.
//!   - A LOW result is clamped to NONE / "Continue monitoring".
//!     Reasons and interventions are kept as evidence.
//!   - No I/O, no clock reads inside the rules. `evaluate_at` is pure.

use crate::{
    assessment::{HardshipType, RiskAssessment, RiskLevel},
    snapshot::CustomerSnapshot,
};
use chrono::{Local, NaiveDateTime};

// ── Thresholds ───────────────────────────────────────────────────────────────

const IRREGULAR_INCOME_TXN_THRESHOLD: u64 = 20;
const PANIC_WITHDRAWAL_THRESHOLD: u64 = 10;
const ELEVATED_WITHDRAWAL_THRESHOLD: u64 = 5;
const SEVERE_PRESSURE_RATIO: f64 = 2.0;
const SURVIVAL_MODE_TXN_THRESHOLD: u64 = 2;
const VELOCITY_TXN_THRESHOLD: u64 = 50;
const VELOCITY_SPEND_THRESHOLD: f64 = 10_000.0;
const DORMANT_TXN_THRESHOLD: u64 = 2;

// ── Recommended actions ──────────────────────────────────────────────────────

pub const ACTION_CONTINUE_MONITORING: &str = "Continue monitoring";
pub const ACTION_INCOME_SHOCK: &str = "Offer payment holiday & verify employment";
pub const ACTION_PANIC_WITHDRAWAL: &str = "Flag for urgent review & suggest digital payments";
pub const ACTION_ELEVATED_WITHDRAWAL: &str = "Send financial literacy tips";
pub const ACTION_SEVERE_PRESSURE: &str = "Refer to financial counsellor & offer EMI restructuring";
pub const ACTION_PRESSURE: &str = "Send budgeting tips notification";
pub const ACTION_SURVIVAL_MODE: &str = "Offer payment holiday for 1 month";

type Rule = fn(&CustomerSnapshot, &mut Evaluation);

const RULES: [(&str, Rule); 6] = [
    ("income", income_rule),
    ("withdrawal", withdrawal_rule),
    ("spending_pressure", spending_pressure_rule),
    ("survival_mode", survival_mode_rule),
    ("velocity", velocity_rule),
    ("dormancy", dormancy_rule),
];

/// Evaluate a snapshot, stamping the assessment with the current local time.
pub fn evaluate(snapshot: &CustomerSnapshot) -> RiskAssessment {
    evaluate_at(snapshot, Local::now().naive_local())
}

/// Evaluate a snapshot with an explicit evaluation timestamp.
/// Identical inputs always yield identical assessments.
pub fn evaluate_at(snapshot: &CustomerSnapshot, evaluated_at: NaiveDateTime) -> RiskAssessment {
    let mut eval = Evaluation::default();
    for (name, rule) in RULES {
        let before = eval.score;
        rule(snapshot, &mut eval);
        if eval.score != before {
            log::trace!("rule {name}: +{}", eval.score - before);
        }
    }

    let risk_level = RiskLevel::from_score(eval.score);
    let (hardship_type, recommended_action) = match (risk_level, eval.hardship) {
        (RiskLevel::Low, _) | (_, None) => {
            (HardshipType::None, ACTION_CONTINUE_MONITORING.to_string())
        }
        (_, Some((hardship, action))) => (hardship, action.to_string()),
    };

    RiskAssessment {
        risk_score: eval.score,
        risk_level,
        hardship_type,
        recommended_action,
        reasons: eval.reasons,
        interventions: eval.interventions,
        evaluated_at,
    }
}

/// Essential-to-discretionary ratio rounded half away from zero to one
/// decimal place. Callers guarantee a positive denominator.
pub fn spend_ratio(essential: f64, discretionary: f64) -> f64 {
    (essential / discretionary * 10.0).round() / 10.0
}

/// Running state threaded through the rules.
#[derive(Debug, Default)]
struct Evaluation {
    score: u32,
    hardship: Option<(HardshipType, &'static str)>,
    reasons: Vec<String>,
    interventions: Vec<String>,
}

impl Evaluation {
    fn add(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    fn reason(&mut self, text: String) {
        self.reasons.push(text);
    }

    fn intervene(&mut self, text: &str) {
        self.interventions.push(text.to_string());
    }

    /// First match wins.
    fn classify(&mut self, hardship: HardshipType, action: &'static str) {
        if self.hardship.is_none() {
            self.hardship = Some((hardship, action));
        }
    }

    fn override_classification(&mut self, hardship: HardshipType, action: &'static str) {
        self.hardship = Some((hardship, action));
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

fn income_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    if s.salary_count == 0 {
        e.add(3);
        e.classify(HardshipType::IncomeShock, ACTION_INCOME_SHOCK);
        e.reason("No salary credited yet: possible job loss or delayed payment".into());
        e.intervene("Contact customer to verify employment status");
        e.intervene("Offer EMI restructuring plan");
    } else if s.salary_count == 1 && s.txn_count > IRREGULAR_INCOME_TXN_THRESHOLD {
        e.add(1);
        e.reason(format!(
            "Only 1 salary credit across {} transactions: irregular income pattern",
            s.txn_count
        ));
        e.intervene("Monitor salary frequency over next 30 days");
    }
}

fn withdrawal_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    if s.withdrawals > PANIC_WITHDRAWAL_THRESHOLD {
        e.add(3);
        e.classify(HardshipType::LiquidityStress, ACTION_PANIC_WITHDRAWAL);
        e.reason(format!(
            "Very high cash withdrawals: {} times, panic withdrawal pattern",
            s.withdrawals
        ));
        e.intervene("Flag for urgent manual review");
        e.intervene("Suggest digital payment alternatives");
    } else if s.withdrawals > ELEVATED_WITHDRAWAL_THRESHOLD {
        e.add(2);
        e.classify(HardshipType::LiquidityStress, ACTION_ELEVATED_WITHDRAWAL);
        e.reason(format!(
            "High ATM withdrawals: {} times, above normal threshold ({ELEVATED_WITHDRAWAL_THRESHOLD})",
            s.withdrawals
        ));
        e.intervene("Send financial literacy tips via SMS");
    }
}

fn spending_pressure_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    let (essential, discretionary) = (s.essential_spend, s.discretionary_spend);
    if essential <= 0.0 || discretionary <= 0.0 {
        return;
    }
    if essential > SEVERE_PRESSURE_RATIO * discretionary {
        e.add(3);
        e.override_classification(HardshipType::ExpenseCompression, ACTION_SEVERE_PRESSURE);
        e.reason(format!(
            "Severe financial stress: essential spending {:.1}x higher than discretionary",
            spend_ratio(essential, discretionary)
        ));
        e.reason(format!(
            "Essential: {essential:.0} | Discretionary: {discretionary:.0}"
        ));
        e.intervene("Refer to financial counsellor immediately");
        e.intervene("Offer emergency microloan at reduced rate");
    } else if essential > discretionary {
        e.add(2);
        e.classify(HardshipType::ExpenseCompression, ACTION_PRESSURE);
        e.reason(format!(
            "Financial pressure: essential ({essential:.0}) exceeds discretionary ({discretionary:.0})"
        ));
        e.intervene("Send budgeting tips notification");
    }
}

fn survival_mode_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    if s.essential_spend > 0.0
        && s.discretionary_spend == 0.0
        && s.txn_count > SURVIVAL_MODE_TXN_THRESHOLD
    {
        e.add(2);
        e.classify(HardshipType::ExpenseCompression, ACTION_SURVIVAL_MODE);
        e.reason(format!(
            "Only essential spending ({:.0}), zero discretionary: survival mode",
            s.essential_spend
        ));
        e.intervene("Offer payment holiday for 1 month");
    }
}

fn velocity_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    if s.txn_count > VELOCITY_TXN_THRESHOLD && s.total_spend > VELOCITY_SPEND_THRESHOLD {
        e.add(1);
        e.reason(format!(
            "High transaction velocity: {} transactions, {:.0} total spend",
            s.txn_count, s.total_spend
        ));
        e.intervene("Activate spending limit alerts");
    }
}

fn dormancy_rule(s: &CustomerSnapshot, e: &mut Evaluation) {
    if s.txn_count <= DORMANT_TXN_THRESHOLD && s.salary_count == 0 {
        e.reason(format!(
            "Very low activity ({} txns) with no salary: possible account abandonment",
            s.txn_count
        ));
        e.intervene("Send re-engagement notification");
    }
}
