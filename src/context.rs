//! Grounding context for the generation call.
//!
//! Tool payloads are rendered as labelled JSON sections after a short user
//! section, and the whole block is appended to a fixed Spanish preamble.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::{AccountType, UserProfile};
use crate::classifier::is_balance_tool;
use crate::llm::{Turn, TurnRole};
use crate::payload::{format_money, number_at, value_at};

/// Instructions sent ahead of every conversation.
pub const PREAMBLE: &str = "\
Eres Maya, la asistente virtual financiera de Banorte, un banco mexicano.
Ayudas a empresas y personas a entender su situación financiera: saldos, \
gastos por categoría, flujo de caja, escenarios hipotéticos, riesgos, \
alertas y planes financieros.

Estilo de respuesta:
- Responde siempre en español, con tono profesional, cálido y claro.
- Sé concisa: usa párrafos cortos y listas cuando ayuden a la lectura.
- Basa tus cifras únicamente en los datos financieros proporcionados. Si no \
hay datos para lo que se pregunta, dilo y sugiere qué puede consultar el usuario.
- No inventes movimientos, saldos ni productos.

Interpretación de datos:
- Formatea las cantidades como moneda mexicana, por ejemplo $1,234,567.89.
- Un balance negativo significa que los gastos superan a los ingresos; \
señálalo con tacto y propone acciones concretas.
- En una prueba de estrés, la resiliencia \"Alta\" indica que la cuenta \
soporta el escenario; \"Moderada\" o \"Baja\" requieren atención, y los meses \
de supervivencia indican cuánto duraría el saldo actual.
- La puntuación de salud financiera va de 0 a 100; por encima de 70 es \
saludable y por debajo de 40 es preocupante.
- En simulaciones, explica el efecto mensual y el saldo proyectado al final \
del periodo.";

/// One tool call and what it returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub args: Map<String, Value>,
    pub result: Option<Value>,
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }
}

/// Render successful outcomes into a context block.
///
/// Returns an empty string when no tool produced a result.
pub fn assemble_context(outcomes: &[ToolOutcome], profile: &UserProfile) -> String {
    let successful: Vec<(&str, &Value)> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().map(|r| (o.tool.as_str(), r)))
        .collect();
    if successful.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Información del usuario\n");
    if let Some(name) = profile.username.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "- Usuario: {name}");
    }
    let kind = match profile.account_type {
        AccountType::Company => "Empresa",
        AccountType::Personal => "Personal",
    };
    let _ = writeln!(out, "- Tipo de cuenta: {kind}");
    if let Some(id) = profile.id() {
        let _ = writeln!(out, "- ID: {id}");
    }

    out.push_str("\n## Datos financieros\n");
    for (tool, result) in successful {
        let _ = writeln!(out, "\n### {tool}");
        if is_balance_tool(tool) {
            out.push_str(&balance_summary(result));
        } else if tool == "get_stress_test" {
            out.push_str(&stress_summary(result));
        }
        let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        let _ = writeln!(out, "```json\n{pretty}\n```");
    }

    out
}

fn balance_summary(payload: &Value) -> String {
    format!(
        "Ingresos: {} | Gastos: {} | Balance: {}\n",
        format_money(number_at(payload, &["data", "ingresos"])),
        format_money(number_at(payload, &["data", "gastos"])),
        format_money(number_at(payload, &["data", "balance"])),
    )
}

fn stress_summary(payload: &Value) -> String {
    let Some(resilience) = value_at(payload, &["resilience"]).and_then(Value::as_str) else {
        return String::new();
    };
    let mut line = format!("Resiliencia: {resilience}");
    if value_at(payload, &["stressed_monthly_net_flow"]).is_some() {
        let flow = number_at(payload, &["stressed_monthly_net_flow"]);
        let _ = write!(line, " | Flujo neto mensual bajo estrés: {}", format_money(flow));
    }
    match value_at(payload, &["estimated_survival_months"]) {
        Some(Value::Number(n)) => {
            let _ = write!(line, " | Meses de supervivencia: {n}");
        }
        Some(Value::String(s)) => {
            let _ = write!(line, " | Meses de supervivencia: {s}");
        }
        _ => {}
    }
    line.push('\n');
    line
}

/// Preamble plus context as the leading system turn, then prior turns, then
/// the current message.
pub fn build_prompt(context: &str, history: &[Turn], message: &str) -> Vec<Turn> {
    let system = if context.is_empty() {
        PREAMBLE.to_string()
    } else {
        format!("{PREAMBLE}\n\n{context}")
    };

    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(Turn::new(TurnRole::System, system));
    turns.extend(
        history
            .iter()
            .filter(|t| t.role != TurnRole::System && !t.text.trim().is_empty())
            .cloned(),
    );
    turns.push(Turn::new(TurnRole::User, message));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(tool: &str, result: Option<Value>) -> ToolOutcome {
        ToolOutcome {
            tool: tool.to_string(),
            args: Map::new(),
            result,
        }
    }

    #[test]
    fn test_empty_when_nothing_succeeded() {
        let profile = UserProfile::default();
        assert_eq!(assemble_context(&[], &profile), "");
        assert_eq!(
            assemble_context(&[outcome("get_alerts", None)], &profile),
            ""
        );
    }

    #[test]
    fn test_balance_section_with_summary() {
        let profile = UserProfile::new(AccountType::Company, Some("E001"));
        let payload = json!({
            "success": true,
            "data": { "ingresos": 1_500_000.0, "gastos": 1_200_000.5, "balance": 299_999.5 }
        });
        let ctx = assemble_context(
            &[
                outcome("get_company_balance", Some(payload)),
                outcome("get_alerts", None),
            ],
            &profile,
        );

        assert!(ctx.contains("- Tipo de cuenta: Empresa"));
        assert!(ctx.contains("- ID: E001"));
        assert!(ctx.contains("### get_company_balance"));
        assert!(ctx.contains("Ingresos: $1,500,000.00 | Gastos: $1,200,000.50 | Balance: $299,999.50"));
        assert!(!ctx.contains("### get_alerts"));
    }

    #[test]
    fn test_balance_summary_defaults_missing_fields() {
        let ctx = assemble_context(
            &[outcome("get_personal_balance", Some(json!({ "success": false })))],
            &UserProfile::default(),
        );
        assert!(ctx.contains("Ingresos: $0.00 | Gastos: $0.00 | Balance: $0.00"));
    }

    #[test]
    fn test_stress_resilience_line() {
        let payload = json!({
            "success": true,
            "resilience": "Moderada",
            "stressed_monthly_net_flow": -50_000.0,
            "estimated_survival_months": 8.5
        });
        let ctx = assemble_context(
            &[outcome("get_stress_test", Some(payload))],
            &UserProfile::default(),
        );
        assert!(ctx.contains(
            "Resiliencia: Moderada | Flujo neto mensual bajo estrés: -$50,000.00 | Meses de supervivencia: 8.5"
        ));
    }

    #[test]
    fn test_prompt_order() {
        let history = vec![
            Turn::new(TurnRole::User, "hola"),
            Turn::new(TurnRole::Model, "¡Hola! Soy Maya."),
        ];
        let turns = build_prompt("ctx", &history, "¿mi saldo?");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, TurnRole::System);
        assert!(turns[0].text.starts_with(PREAMBLE));
        assert!(turns[0].text.ends_with("ctx"));
        assert_eq!(turns[3], Turn::new(TurnRole::User, "¿mi saldo?"));

        let bare = build_prompt("", &[], "hola");
        assert_eq!(bare[0].text, PREAMBLE);
    }
}
