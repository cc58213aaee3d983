//! Risk assessment: the derived projection written back for every
//! snapshot on every cycle.
//!
//! An assessment has no identity or history of its own. Each write
//! replaces the full assessment field set on the record.

use crate::types::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FIELD_RISK_LEVEL: &str = "risk_level";
pub const FIELD_RISK_SCORE: &str = "risk_score";
pub const FIELD_HARDSHIP_TYPE: &str = "hardship_type";
pub const FIELD_RECOMMENDED_ACTION: &str = "recommended_action";
pub const FIELD_RISK_REASONS: &str = "risk_reasons";
pub const FIELD_INTERVENTIONS: &str = "interventions";
pub const FIELD_LAST_RISK_EVAL: &str = "last_risk_eval";

/// Every field an assessment owns on a record.
pub const ASSESSMENT_FIELDS: [&str; 7] = [
    FIELD_RISK_LEVEL,
    FIELD_RISK_SCORE,
    FIELD_HARDSHIP_TYPE,
    FIELD_RECOMMENDED_ACTION,
    FIELD_RISK_REASONS,
    FIELD_INTERVENTIONS,
    FIELD_LAST_RISK_EVAL,
];

/// Ordered risk bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Map a risk score onto its band. Bands are exhaustive over all scores.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 6 => RiskLevel::Critical,
            s if s >= 4 => RiskLevel::High,
            s if s >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown risk level '{s}'"))
    }
}

/// Categorical cause label used by outreach to pick a message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardshipType {
    None,
    IncomeShock,
    LiquidityStress,
    ExpenseCompression,
}

impl HardshipType {
    pub const ALL: [HardshipType; 4] = [
        HardshipType::None,
        HardshipType::IncomeShock,
        HardshipType::LiquidityStress,
        HardshipType::ExpenseCompression,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HardshipType::None => "NONE",
            HardshipType::IncomeShock => "INCOME_SHOCK",
            HardshipType::LiquidityStress => "LIQUIDITY_STRESS",
            HardshipType::ExpenseCompression => "EXPENSE_COMPRESSION",
        }
    }
}

impl fmt::Display for HardshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HardshipType::ALL
            .into_iter()
            .find(|h| h.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown hardship type '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub hardship_type: HardshipType,
    pub recommended_action: String,
    /// Explanations in rule-evaluation order. Never deduplicated.
    pub reasons: Vec<String>,
    /// Operator follow-ups suggested by the rules that fired.
    pub interventions: Vec<String>,
    pub evaluated_at: NaiveDateTime,
}

impl RiskAssessment {
    /// The full assessment field set as written to the store.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_RISK_LEVEL.into(), self.risk_level.as_str().into()),
            (FIELD_RISK_SCORE.into(), self.risk_score.to_string()),
            (FIELD_HARDSHIP_TYPE.into(), self.hardship_type.as_str().into()),
            (FIELD_RECOMMENDED_ACTION.into(), self.recommended_action.clone()),
            (FIELD_RISK_REASONS.into(), json_list(&self.reasons)),
            (FIELD_INTERVENTIONS.into(), json_list(&self.interventions)),
            (
                FIELD_LAST_RISK_EVAL.into(),
                self.evaluated_at.format(TIMESTAMP_FORMAT).to_string(),
            ),
        ]
    }
}

fn json_list(items: &[String]) -> String {
    // A Vec<String> always serializes.
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
