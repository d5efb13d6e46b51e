//! Financial plan requests.
//!
//! The browser form is translated into `generate_financial_plan` arguments
//! and sent through the MCP session; the tool's JSON is returned unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::auth::UserProfile;
use crate::mcp::{McpError, McpSession};

pub const PLAN_TOOL: &str = "generate_financial_plan";
pub const PLANNING_HORIZON_MONTHS: u32 = 12;

/// An extra income or expense line from the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomItem {
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_indefinite: bool,
}

impl CustomItem {
    /// Backend (snake_case) form.
    fn to_tool_value(&self) -> Value {
        json!({
            "description": self.description,
            "amount": self.amount,
            "frequency": self.frequency,
            "start_date": self.start_date,
            "end_date": self.end_date,
            "is_indefinite": self.is_indefinite,
        })
    }
}

/// Form inputs sometimes arrive as strings.
fn lenient_amount<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', "").parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    /// `"saved"` to build on stored transactions.
    #[serde(default)]
    pub plan_option: Option<String>,
    #[serde(default)]
    pub custom_incomes: Vec<CustomItem>,
    #[serde(default)]
    pub custom_expenses: Vec<CustomItem>,
    #[serde(default)]
    pub plan_goal: Option<String>,
    #[serde(default)]
    pub user_info: Option<UserProfile>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("La meta del plan financiero es requerida")]
    MissingGoal,
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error("Respuesta del plan no es JSON válido: {0}")]
    Decode(#[source] serde_json::Error),
}

impl PlanRequest {
    pub fn goal(&self) -> Option<&str> {
        self.plan_goal
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    pub fn to_tool_args(&self) -> Result<Map<String, Value>, PlanError> {
        let goal = self.goal().ok_or(PlanError::MissingGoal)?;
        let profile = self.user_info.clone().unwrap_or_default();

        let mut args = Map::new();
        args.insert(
            "entity_type".into(),
            json!(profile.account_type.entity_type()),
        );
        if let Some(id) = profile.id() {
            args.insert("entity_id".into(), json!(id));
        }
        args.insert("plan_goal".into(), json!(goal));
        args.insert(
            "use_saved_data".into(),
            json!(self.plan_option.as_deref() == Some("saved")),
        );
        args.insert(
            "additional_incomes".into(),
            Value::Array(self.custom_incomes.iter().map(CustomItem::to_tool_value).collect()),
        );
        args.insert(
            "additional_expenses".into(),
            Value::Array(self.custom_expenses.iter().map(CustomItem::to_tool_value).collect()),
        );
        args.insert(
            "planning_horizon_months".into(),
            json!(PLANNING_HORIZON_MONTHS),
        );
        Ok(args)
    }
}

/// Run the plan tool. Unlike chat, failures are reported to the caller.
pub async fn generate_plan(session: &McpSession, req: &PlanRequest) -> Result<Value, PlanError> {
    let args = req.to_tool_args()?;
    let result = session.call_tool(PLAN_TOOL, args).await?;

    if let Some(text) = result.first_text() {
        return serde_json::from_str(text).map_err(PlanError::Decode);
    }
    Ok(result.into_payload())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountType;

    #[test]
    fn test_blank_goal_rejected() {
        let req = PlanRequest {
            plan_goal: Some("   ".to_string()),
            ..PlanRequest::default()
        };
        assert!(matches!(req.to_tool_args(), Err(PlanError::MissingGoal)));
        assert_eq!(
            PlanError::MissingGoal.to_string(),
            "La meta del plan financiero es requerida"
        );
    }

    #[test]
    fn test_tool_args_from_form() {
        let req: PlanRequest = serde_json::from_value(json!({
            "planOption": "saved",
            "planGoal": "Ahorrar $10,000 en 6 meses",
            "customIncomes": [{
                "description": "Freelance",
                "amount": "2,500",
                "frequency": "monthly",
                "startDate": "2024-01-01",
                "isIndefinite": true
            }],
            "userInfo": { "type": "empresa", "userId": "E004" }
        }))
        .unwrap();
        assert_eq!(
            req.user_info.as_ref().map(|u| u.account_type),
            Some(AccountType::Company)
        );

        let args = req.to_tool_args().unwrap();
        assert_eq!(args["entity_type"], "company");
        assert_eq!(args["entity_id"], "E004");
        assert_eq!(args["use_saved_data"], true);
        assert_eq!(args["planning_horizon_months"], 12);
        assert_eq!(args["additional_incomes"][0]["amount"], 2500.0);
        assert_eq!(args["additional_incomes"][0]["start_date"], "2024-01-01");
        assert_eq!(args["additional_incomes"][0]["is_indefinite"], true);
        assert_eq!(args["additional_expenses"], json!([]));
    }

    #[test]
    fn test_defaults_to_personal_without_id() {
        let req = PlanRequest {
            plan_goal: Some("pagar deudas".to_string()),
            plan_option: Some("custom".to_string()),
            ..PlanRequest::default()
        };
        let args = req.to_tool_args().unwrap();
        assert_eq!(args["entity_type"], "personal");
        assert!(!args.contains_key("entity_id"));
        assert_eq!(args["use_saved_data"], false);
    }
}
