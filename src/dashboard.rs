//! Balance and expense summary for the dashboard cards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::mcp::McpSession;
use crate::payload::{number_at, value_at};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinancialDataQuery {
    pub company_id: Option<String>,
    pub user_id: Option<String>,
}

impl FinancialDataQuery {
    fn entity_id(&self) -> Option<&str> {
        self.company_id
            .as_deref()
            .or(self.user_id.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub ingresos_totales: f64,
    pub gastos_totales: f64,
    pub balance_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseSummary {
    pub categorias: Vec<Value>,
    pub total_gastos: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub balance: BalanceSummary,
    pub expenses: ExpenseSummary,
}

impl FinancialSummary {
    pub fn from_payloads(balance: &Value, expenses: &Value) -> Self {
        Self {
            balance: BalanceSummary {
                ingresos_totales: number_at(balance, &["data", "ingresos"]),
                gastos_totales: number_at(balance, &["data", "gastos"]),
                balance_total: number_at(balance, &["data", "balance"]),
            },
            expenses: ExpenseSummary {
                categorias: value_at(expenses, &["data", "categorias"])
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                total_gastos: number_at(expenses, &["data", "total_gastos"]),
            },
        }
    }

    /// Figures shown when the backend cannot be reached.
    pub fn sample() -> Self {
        let categoria = |name: &str, total: f64, transacciones: u32| {
            json!({ "categoria": name, "total": total, "transacciones": transacciones })
        };
        Self {
            balance: BalanceSummary {
                ingresos_totales: 150_000.0,
                gastos_totales: 85_000.0,
                balance_total: 65_000.0,
            },
            expenses: ExpenseSummary {
                categorias: vec![
                    categoria("Nómina", 45_000.0, 12),
                    categoria("Servicios", 15_000.0, 8),
                    categoria("Compras", 12_000.0, 25),
                    categoria("Transporte", 8_000.0, 15),
                    categoria("Otros", 5_000.0, 10),
                ],
                total_gastos: 85_000.0,
            },
        }
    }
}

/// Tool names and arguments for the id's account kind.
///
/// `E…` ids are companies, all-digit ids are personal accounts, anything else
/// uses the company tools without an id.
fn account_tools(entity_id: Option<&str>) -> (&'static str, Map<String, Value>) {
    let mut args = Map::new();
    match entity_id {
        Some(id) if id.starts_with('E') => {
            args.insert("company_id".into(), json!(id));
            ("get_company_balance", args)
        }
        Some(id) if id.chars().all(|c| c.is_ascii_digit()) => {
            args.insert("user_id".into(), json!(id));
            ("get_personal_balance", args)
        }
        _ => ("get_company_balance", args),
    }
}

/// Fetch the summary, falling back to sample figures on any failure.
pub async fn financial_summary(session: &McpSession, query: &FinancialDataQuery) -> FinancialSummary {
    let (balance_tool, args) = account_tools(query.entity_id());
    let balance = session.call_tool(balance_tool, args.clone());
    let expenses = session.call_tool("analyze_expenses_by_category", args);

    match tokio::try_join!(balance, expenses) {
        Ok((balance, expenses)) => {
            FinancialSummary::from_payloads(&balance.into_payload(), &expenses.into_payload())
        }
        Err(err) => {
            tracing::warn!(
                name: "dashboard.fallback",
                tool = balance_tool,
                error = %err,
                "Serving sample financial data"
            );
            FinancialSummary::sample()
        }
    }
}
