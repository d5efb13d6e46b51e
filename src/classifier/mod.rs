//! Keyword intent classification.
//!
//! A message is lower-cased and matched against [`rules::RULES`]. Each rule
//! that fires contributes one tool invocation with arguments derived from the
//! caller's identity. There is no scoring: presence of a trigger is enough.

pub mod rules;
pub mod scenario;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::auth::{AccountType, UserProfile};
pub use rules::{Category, RULES, Scope, ToolRule, ToolTarget};
pub use scenario::{Direction, FinancialSnapshot, ScenarioRequest, ScenarioTarget};

/// Arguments for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolArgs {
    /// Fully determined at classification time.
    Ready(Map<String, Value>),
    /// Computed from a balance payload fetched earlier in the same request.
    Scenario(ScenarioRequest),
}

impl ToolArgs {
    /// Resolve to a JSON object, using `snapshot` for derived arguments.
    pub fn resolve(&self, snapshot: &FinancialSnapshot) -> Map<String, Value> {
        match self {
            Self::Ready(map) => map.clone(),
            Self::Scenario(req) => req.derive_args(snapshot),
        }
    }
}

/// A selected tool and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: ToolArgs,
}

/// Whether `tool` returns the balance figures scenarios are computed from.
pub fn is_balance_tool(tool: &str) -> bool {
    tool == rules::BALANCE_TOOLS.resolve(AccountType::Company)
        || tool == rules::BALANCE_TOOLS.resolve(AccountType::Personal)
}

/// Select tools for `message`.
///
/// Output follows rule order, each tool at most once. A scenario always comes
/// after the account's balance tool, which is added if no rule selected it.
pub fn classify(message: &str, profile: &UserProfile) -> Vec<ToolInvocation> {
    let lowered = message.to_lowercase();
    let mut selected: Vec<ToolInvocation> = Vec::new();

    for rule in RULES.iter().filter(|r| r.matches(&lowered)) {
        let tool = rule.tool.resolve(profile.account_type);
        if selected.iter().any(|inv| inv.tool == tool) {
            continue;
        }

        let args = match rule.scope {
            Scope::Derived => {
                ensure_balance(&mut selected, profile);
                ToolArgs::Scenario(ScenarioRequest::parse(&lowered))
            }
            scope => {
                let mut map = identity_args(scope, profile);
                (rule.extra)(&lowered, &mut map);
                ToolArgs::Ready(map)
            }
        };

        selected.push(ToolInvocation {
            tool: tool.to_string(),
            args,
        });
    }

    tracing::debug!(
        name: "classifier.selected",
        tools = ?selected.iter().map(|i| i.tool.as_str()).collect::<Vec<_>>(),
        account_type = profile.account_type.as_str(),
        "Classified message"
    );

    selected
}

fn ensure_balance(selected: &mut Vec<ToolInvocation>, profile: &UserProfile) {
    let tool = rules::BALANCE_TOOLS.resolve(profile.account_type);
    if selected.iter().any(|inv| inv.tool == tool) {
        return;
    }
    selected.push(ToolInvocation {
        tool: tool.to_string(),
        args: ToolArgs::Ready(identity_args(Scope::CompanyOrUser, profile)),
    });
}

/// Identity arguments for `scope`. Empty when the profile has no id.
pub fn identity_args(scope: Scope, profile: &UserProfile) -> Map<String, Value> {
    let mut map = Map::new();
    let Some(id) = profile.id() else {
        return map;
    };

    match (scope, profile.account_type) {
        (Scope::CompanyOrUser | Scope::CompanyOnly, AccountType::Company) => {
            map.insert("company_id".into(), json!(id));
        }
        (Scope::CompanyOrUser, AccountType::Personal) => {
            map.insert("user_id".into(), json!(id));
        }
        (Scope::Entity, account) => {
            map.insert("entity_type".into(), json!(account.entity_type()));
            map.insert("entity_id".into(), json!(id));
        }
        (Scope::CompanyOnly | Scope::Derived, _) => {}
    }
    map
}
