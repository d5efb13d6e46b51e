//! "What-if" scenario extraction.
//!
//! Pulls numbers out of the raw message and turns them into arguments for
//! `simulate_financial_scenario`, once the account's balance figures are known.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::payload::{first_number, number_at};

/// A number with an optional unit suffix.
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d+(?:[.,]\d+)*)\s*(%|(?:por\s?ciento|meses|mes|millones|millón|millon|mil|k)\b)?",
    )
    .expect("number pattern is valid")
});

const DEFAULT_MONTHS: u32 = 6;
const MAX_MONTHS: u32 = 24;

const INCOME_WORDS: &[&str] = &["ingreso", "sueldo", "salario", "ventas", "income", "gano"];
const DECREASE_WORDS: &[&str] = &[
    "reduc", "reduz", "disminu", "bajan", "baja ", "bajar", "menos", "caen", "cae ", "pierd", "perder",
    "recort", "decrease", "drop",
];

/// Which monthly figure a scenario changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTarget {
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// A parsed "what if" question, before figures are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// Magnitude of the change; `None` when the message named no amount.
    pub amount: Option<f64>,
    /// Whether `amount` is a percentage of the current monthly figure.
    pub percent: bool,
    pub target: ScenarioTarget,
    pub direction: Direction,
    pub months: u32,
}

/// Figures a scenario is computed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub current_balance: f64,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
}

impl FinancialSnapshot {
    /// Read a balance tool payload (`{data: {ingresos, gastos, balance}}`).
    /// Monthly fields win over totals when the backend provides them.
    pub fn from_balance_payload(payload: &Value) -> Self {
        Self {
            current_balance: number_at(payload, &["data", "balance"]),
            monthly_income: first_number(
                payload,
                &[&["data", "ingresos_mensuales"], &["data", "ingresos"]],
            ),
            monthly_expenses: first_number(
                payload,
                &[&["data", "gastos_mensuales"], &["data", "gastos"]],
            ),
        }
    }
}

impl ScenarioRequest {
    /// Parse an already lower-cased message.
    pub fn parse(lowered: &str) -> Self {
        let mut amount = None;
        let mut percent = false;
        let mut months = None;

        for caps in NUMBER.captures_iter(lowered) {
            let Some(value) = caps.get(1).and_then(|m| parse_amount(m.as_str())) else {
                continue;
            };
            let unit = caps.get(2).map(|m| m.as_str().trim());

            match unit {
                Some("mes" | "meses") => {
                    if months.is_none() {
                        months = Some(value.round().clamp(1.0, f64::from(MAX_MONTHS)) as u32);
                    }
                }
                Some(u) if u == "%" || u.starts_with("por") => {
                    if amount.is_none() {
                        amount = Some(value);
                        percent = true;
                    }
                }
                Some("mil" | "k") => {
                    amount.get_or_insert(value * 1_000.0);
                }
                Some(_) => {
                    amount.get_or_insert(value * 1_000_000.0);
                }
                None => {
                    amount.get_or_insert(value);
                }
            }
        }

        let target = if contains_any(lowered, INCOME_WORDS) {
            ScenarioTarget::Income
        } else {
            ScenarioTarget::Expense
        };
        let direction = if contains_any(lowered, DECREASE_WORDS) {
            Direction::Decrease
        } else {
            Direction::Increase
        };

        Self {
            amount,
            percent,
            target,
            direction,
            months: months.unwrap_or(DEFAULT_MONTHS),
        }
    }

    /// Signed monthly change implied by this request against `snapshot`.
    pub fn delta(&self, snapshot: &FinancialSnapshot) -> f64 {
        let Some(amount) = self.amount else {
            return 0.0;
        };
        let base = match self.target {
            ScenarioTarget::Income => snapshot.monthly_income,
            ScenarioTarget::Expense => snapshot.monthly_expenses,
        };
        let magnitude = if self.percent {
            base * amount / 100.0
        } else {
            amount
        };
        let signed = match self.direction {
            Direction::Increase => magnitude,
            Direction::Decrease => -magnitude,
        };
        round2(signed)
    }

    /// Arguments for `simulate_financial_scenario`.
    pub fn derive_args(&self, snapshot: &FinancialSnapshot) -> Map<String, Value> {
        let delta = self.delta(snapshot);
        let (income_change, expense_change) = match self.target {
            ScenarioTarget::Income => (delta, 0.0),
            ScenarioTarget::Expense => (0.0, delta),
        };

        let args = json!({
            "current_balance": round2(snapshot.current_balance),
            "monthly_income_change": income_change,
            "monthly_expense_change": expense_change,
            "months": self.months,
        });
        match args {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Every percentage in the message with its byte span.
pub(crate) fn percentages(lowered: &str) -> Vec<(f64, usize, usize)> {
    NUMBER
        .captures_iter(lowered)
        .filter_map(|caps| {
            let unit = caps.get(2)?.as_str();
            if unit != "%" && !unit.starts_with("por") {
                return None;
            }
            let whole = caps.get(0)?;
            Some((
                parse_amount(caps.get(1)?.as_str())?,
                whole.start(),
                whole.end(),
            ))
        })
        .collect()
}

/// First "N meses" in the message.
pub(crate) fn months_mentioned(lowered: &str) -> Option<u32> {
    NUMBER.captures_iter(lowered).find_map(|caps| {
        matches!(caps.get(2)?.as_str(), "mes" | "meses")
            .then(|| parse_amount(caps.get(1)?.as_str()))
            .flatten()
            .map(|v| v.round().clamp(1.0, f64::from(MAX_MONTHS)) as u32)
    })
}

/// Parse `1,000,000`, `2.500`, `1.5` or `12,75`. A trailing group of exactly
/// three digits is a thousands group; anything else after the last separator
/// is a fraction.
fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = match raw.rfind([',', '.']) {
        Some(idx) if raw.len() - idx - 1 != 3 => {
            let (int, frac) = raw.split_at(idx);
            format!("{}.{}", int.replace([',', '.'], ""), &frac[1..])
        }
        _ => raw.replace([',', '.'], ""),
    };
    normalized.parse().ok()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
