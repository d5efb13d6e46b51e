//! Trigger vocabulary, one row per tool category.
//!
//! Triggers are lower-case substrings matched against the lower-cased message.
//! Order matters only for output order: the balance rule comes first so a
//! scenario can reuse its figures.

use serde_json::{Map, Value, json};

use super::scenario::{months_mentioned, percentages};
use crate::auth::AccountType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Balance,
    Expenses,
    MonthSpending,
    CashFlow,
    Scenario,
    Health,
    Risk,
    Alerts,
    StressTest,
    Trends,
    Recommendations,
    Anomalies,
    CashShortage,
    Budget,
    Investment,
}

/// Which tool a rule names.
#[derive(Debug, Clone, Copy)]
pub enum ToolTarget {
    Fixed(&'static str),
    PerAccount {
        company: &'static str,
        personal: &'static str,
    },
}

impl ToolTarget {
    pub fn resolve(self, account: AccountType) -> &'static str {
        match self {
            Self::Fixed(name) => name,
            Self::PerAccount { company, personal } => match account {
                AccountType::Company => company,
                AccountType::Personal => personal,
            },
        }
    }
}

/// How the caller's identity maps onto tool arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `company_id` for companies, `user_id` for personal accounts.
    CompanyOrUser,
    /// `company_id` for companies; personal accounts send no id.
    CompanyOnly,
    /// `entity_type` plus `entity_id`.
    Entity,
    /// Arguments are computed later from fetched figures.
    Derived,
}

pub type ExtraArgs = fn(&str, &mut Map<String, Value>);

#[derive(Debug, Clone, Copy)]
pub struct ToolRule {
    pub category: Category,
    pub tool: ToolTarget,
    pub triggers: &'static [&'static str],
    pub scope: Scope,
    pub extra: ExtraArgs,
}

pub const BALANCE_TOOLS: ToolTarget = ToolTarget::PerAccount {
    company: "get_company_balance",
    personal: "get_personal_balance",
};

pub static RULES: &[ToolRule] = &[
    ToolRule {
        category: Category::Balance,
        tool: BALANCE_TOOLS,
        triggers: &[
            "balance",
            "saldo",
            "cuánto tengo",
            "cuanto tengo",
            "dinero disponible",
            "estado de cuenta",
        ],
        scope: Scope::CompanyOrUser,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Expenses,
        tool: ToolTarget::Fixed("analyze_expenses_by_category"),
        triggers: &[
            "gasto",
            "categoría",
            "categoria",
            "en qué gasto",
            "en que gasto",
            "expense",
        ],
        scope: Scope::CompanyOrUser,
        extra: no_extra,
    },
    ToolRule {
        category: Category::MonthSpending,
        tool: ToolTarget::Fixed("get_current_month_spending"),
        triggers: &["este mes", "mes actual", "this month"],
        scope: Scope::Entity,
        extra: no_extra,
    },
    ToolRule {
        category: Category::CashFlow,
        tool: ToolTarget::Fixed("project_cash_flow"),
        triggers: &[
            "flujo de caja",
            "flujo de efectivo",
            "proyecc",
            "proyect",
            "próximos meses",
            "proximos meses",
            "cash flow",
        ],
        scope: Scope::CompanyOnly,
        extra: cash_flow_months,
    },
    ToolRule {
        category: Category::Scenario,
        tool: ToolTarget::Fixed("simulate_financial_scenario"),
        triggers: &[
            "qué pasa si",
            "que pasa si",
            "qué pasaría",
            "que pasaria",
            "simula",
            "escenario",
            "what if",
        ],
        scope: Scope::Derived,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Health,
        tool: ToolTarget::Fixed("get_financial_health_score"),
        triggers: &[
            "salud financiera",
            "score",
            "puntaje",
            "puntuación",
            "puntuacion",
            "calificación",
            "calificacion",
            "health",
        ],
        scope: Scope::CompanyOrUser,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Risk,
        tool: ToolTarget::Fixed("assess_financial_risk"),
        triggers: &["riesgo", "risk"],
        scope: Scope::CompanyOnly,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Alerts,
        tool: ToolTarget::Fixed("get_alerts"),
        triggers: &["alerta", "alert", "aviso"],
        scope: Scope::CompanyOnly,
        extra: alert_severity,
    },
    ToolRule {
        category: Category::StressTest,
        tool: ToolTarget::Fixed("get_stress_test"),
        triggers: &["estrés", "estres", "stress"],
        scope: Scope::CompanyOnly,
        extra: stress_percentages,
    },
    ToolRule {
        category: Category::Trends,
        tool: ToolTarget::Fixed("get_spending_trends"),
        triggers: &[
            "tendencia",
            "trend",
            "patrón de gasto",
            "patron de gasto",
            "evolución",
            "evolucion",
        ],
        scope: Scope::CompanyOnly,
        extra: trend_months,
    },
    ToolRule {
        category: Category::Recommendations,
        tool: ToolTarget::Fixed("get_category_recommendations"),
        triggers: &[
            "recomienda",
            "recomendac",
            "consejo",
            "ahorrar",
            "reducir gastos",
            "optimizar",
            "recommend",
        ],
        scope: Scope::CompanyOnly,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Anomalies,
        tool: ToolTarget::Fixed("detect_anomalies"),
        triggers: &["anomal", "inusual", "sospechos", "anomaly", "unusual"],
        scope: Scope::CompanyOnly,
        extra: no_extra,
    },
    ToolRule {
        category: Category::CashShortage,
        tool: ToolTarget::Fixed("predict_cash_shortage"),
        triggers: &[
            "escasez",
            "quedarme sin",
            "quedar sin",
            "sin efectivo",
            "falta de efectivo",
            "shortage",
        ],
        scope: Scope::CompanyOnly,
        extra: shortage_months,
    },
    ToolRule {
        category: Category::Budget,
        tool: ToolTarget::Fixed("compare_budget_vs_actual"),
        triggers: &["presupuest", "budget"],
        scope: Scope::CompanyOnly,
        extra: no_extra,
    },
    ToolRule {
        category: Category::Investment,
        tool: ToolTarget::Fixed("get_investment_recommendations"),
        triggers: &["invertir", "inversión", "inversion", "invest", "fondo"],
        scope: Scope::Entity,
        extra: risk_tolerance,
    },
];

impl ToolRule {
    pub fn matches(&self, lowered: &str) -> bool {
        self.triggers.iter().any(|t| lowered.contains(t))
    }
}

fn no_extra(_lowered: &str, _args: &mut Map<String, Value>) {}

fn cash_flow_months(lowered: &str, args: &mut Map<String, Value>) {
    if let Some(months) = months_mentioned(lowered) {
        args.insert("months".into(), json!(months));
    }
}

fn trend_months(lowered: &str, args: &mut Map<String, Value>) {
    if let Some(months) = months_mentioned(lowered) {
        args.insert("months_back".into(), json!(months));
    }
}

fn shortage_months(lowered: &str, args: &mut Map<String, Value>) {
    if let Some(months) = months_mentioned(lowered) {
        args.insert("months_ahead".into(), json!(months));
    }
}

fn alert_severity(lowered: &str, args: &mut Map<String, Value>) {
    let severity = if lowered.contains("crític") || lowered.contains("critic") {
        Some("critical")
    } else if has_word(lowered, &["alta", "altas", "grave", "graves"]) {
        Some("high")
    } else {
        None
    };
    if let Some(severity) = severity {
        args.insert("severity".into(), json!(severity));
    }
}

/// Whether any of `words` appears as a whole word.
fn has_word(lowered: &str, words: &[&str]) -> bool {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| words.contains(&w))
}

/// Percentages in a stress-test question are assigned by the word that
/// follows each number ("30% menos ingresos", "20% más gastos"); unlabelled
/// ones fill income reduction first.
fn stress_percentages(lowered: &str, args: &mut Map<String, Value>) {
    let found = percentages(lowered);
    let mut income = None;
    let mut expense = None;
    let mut unlabelled = Vec::new();

    for (i, (value, _, end)) in found.iter().enumerate() {
        let stop = found.get(i + 1).map_or(lowered.len(), |next| next.1);
        let tail = &lowered[*end..stop];
        if tail.contains("gasto") && expense.is_none() {
            expense = Some(*value);
        } else if tail.contains("ingreso") && income.is_none() {
            income = Some(*value);
        } else {
            unlabelled.push(*value);
        }
    }

    for value in unlabelled {
        if income.is_none() {
            income = Some(value);
        } else if expense.is_none() {
            expense = Some(value);
        }
    }

    if let Some(v) = income {
        args.insert("income_reduction".into(), json!(v));
    }
    if let Some(v) = expense {
        args.insert("expense_increase".into(), json!(v));
    }
}

fn risk_tolerance(lowered: &str, args: &mut Map<String, Value>) {
    let tolerance = if lowered.contains("conservador") || lowered.contains("conservative") {
        Some("conservative")
    } else if lowered.contains("agresiv") || lowered.contains("aggressive") {
        Some("aggressive")
    } else if lowered.contains("moderad") || lowered.contains("moderate") {
        Some("moderate")
    } else {
        None
    };
    if let Some(t) = tolerance {
        args.insert("risk_tolerance".into(), json!(t));
    }
}
