//! Request dispatcher.
//!
//! One chat turn runs strictly forward:
//! 1. Classify the message into tool invocations
//! 2. Open a fresh MCP session and call each tool in order
//! 3. Render the successful results into a context block
//! 4. Send preamble, context, history and message to the generation driver
//!
//! Tool calls are sequential so a scenario can be computed from the balance
//! fetched just before it. A failed tool is left out of the context; the
//! turn still completes.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::UserProfile;
use crate::classifier::{FinancialSnapshot, ToolArgs, ToolInvocation, classify, is_balance_tool};
use crate::context::{ToolOutcome, assemble_context, build_prompt};
use crate::mcp::{McpClient, McpSession};

use super::{EMPTY_REPLY, Generation, GenerationDriver, GenerationError, Turn};

/// Input for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct ChatTurnRequest {
    pub message: String,
    pub history: Vec<Turn>,
    pub profile: UserProfile,
}

/// Output of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    /// Tools that returned data, with their arguments and payloads.
    pub mcp_data: Vec<ToolOutcome>,
    pub mcp_tools: Vec<String>,
    pub raw_json: Value,
}

#[derive(Clone)]
pub struct Orchestrator {
    mcp: McpClient,
    driver: Arc<dyn GenerationDriver>,
    max_history: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("mcp", &self.mcp)
            .field("driver", &self.driver)
            .field("max_history", &self.max_history)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(mcp: McpClient, driver: Arc<dyn GenerationDriver>, max_history: usize) -> Self {
        Self {
            mcp,
            driver,
            max_history,
        }
    }

    pub fn mcp(&self) -> &McpClient {
        &self.mcp
    }

    pub async fn respond(&self, req: ChatTurnRequest) -> Result<ChatReply, GenerationError> {
        let request_id = Uuid::new_v4();
        let invocations = classify(&req.message, &req.profile);

        tracing::info!(
            name: "chat.turn.started",
            %request_id,
            tools = invocations.len(),
            history = req.history.len(),
            "Chat turn started"
        );

        let outcomes = if invocations.is_empty() {
            Vec::new()
        } else {
            let session = self.mcp.session();
            gather(&session, &invocations).await
        };

        let context = assemble_context(&outcomes, &req.profile);
        let skip = req.history.len().saturating_sub(self.max_history);
        let turns = build_prompt(&context, &req.history[skip..], &req.message);

        let generation = match self.driver.generate(&turns).await {
            Ok(generation) => generation,
            Err(GenerationError::EmptyCandidate { raw }) => Generation {
                text: EMPTY_REPLY.to_string(),
                raw,
            },
            Err(err) => {
                tracing::error!(
                    name: "chat.turn.failed",
                    %request_id,
                    error = %err,
                    "Generation failed"
                );
                return Err(err);
            }
        };

        let mcp_data: Vec<ToolOutcome> = outcomes.into_iter().filter(ToolOutcome::succeeded).collect();
        let mcp_tools = mcp_data.iter().map(|o| o.tool.clone()).collect();

        tracing::info!(
            name: "chat.turn.completed",
            %request_id,
            tools_ok = mcp_data.len(),
            context_chars = context.len(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            response: generation.text,
            mcp_data,
            mcp_tools,
            raw_json: generation.raw,
        })
    }
}

/// Call each tool in order, feeding balance figures to later scenario calls.
///
/// A scenario is only simulated against figures that were actually fetched;
/// without them it is recorded as failed and never sent.
async fn gather(session: &McpSession, invocations: &[ToolInvocation]) -> Vec<ToolOutcome> {
    let mut snapshot: Option<FinancialSnapshot> = None;
    let mut outcomes = Vec::with_capacity(invocations.len());

    for inv in invocations {
        if matches!(inv.args, ToolArgs::Scenario(_)) && snapshot.is_none() {
            tracing::warn!(
                name: "mcp.scenario.skipped",
                tool = %inv.tool,
                "No balance figures; scenario not simulated"
            );
            outcomes.push(ToolOutcome {
                tool: inv.tool.clone(),
                args: Map::new(),
                result: None,
            });
            continue;
        }

        let args = inv.args.resolve(&snapshot.unwrap_or_default());
        let result = session.invoke(&inv.tool, args.clone()).await;

        if is_balance_tool(&inv.tool) {
            if let Some(payload) = result.as_ref().filter(|p| reports_success(p)) {
                snapshot = Some(FinancialSnapshot::from_balance_payload(payload));
            }
        }

        outcomes.push(ToolOutcome {
            tool: inv.tool.clone(),
            args,
            result,
        });
    }

    outcomes
}

/// Payloads carrying `"success": false` hold no figures.
fn reports_success(payload: &Value) -> bool {
    payload.get("success").and_then(Value::as_bool) != Some(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountType;
    use crate::llm::TurnRole;
    use crate::mcp::McpSettings;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingDriver {
        seen: Mutex<Vec<Vec<Turn>>>,
        empty: bool,
    }

    #[async_trait::async_trait]
    impl GenerationDriver for RecordingDriver {
        async fn generate(&self, turns: &[Turn]) -> Result<Generation, GenerationError> {
            self.seen.lock().unwrap().push(turns.to_vec());
            if self.empty {
                return Err(GenerationError::EmptyCandidate {
                    raw: serde_json::json!({ "candidates": [] }),
                });
            }
            Ok(Generation {
                text: "respuesta".to_string(),
                raw: serde_json::json!({ "ok": true }),
            })
        }
    }

    fn unreachable_mcp() -> McpClient {
        McpClient::new(McpSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            ..McpSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_tools_are_left_out() {
        let driver = Arc::new(RecordingDriver::default());
        let orchestrator = Orchestrator::new(unreachable_mcp(), Arc::clone(&driver) as Arc<dyn GenerationDriver>, 20);

        let reply = orchestrator
            .respond(ChatTurnRequest {
                message: "¿cuál es mi balance?".to_string(),
                history: Vec::new(),
                profile: UserProfile::new(AccountType::Personal, None),
            })
            .await
            .unwrap();

        assert_eq!(reply.response, "respuesta");
        assert!(reply.mcp_tools.is_empty());
        assert!(reply.mcp_data.is_empty());

        let seen = driver.seen.lock().unwrap();
        assert!(!seen[0][0].text.contains("###"));
    }

    #[test]
    fn test_failure_payloads_are_not_figures() {
        assert!(reports_success(&serde_json::json!({ "data": { "balance": 1.0 } })));
        assert!(reports_success(&serde_json::json!({ "success": true })));
        assert!(!reports_success(&serde_json::json!({ "success": false, "error": "sin datos" })));
    }

    #[tokio::test]
    async fn test_scenario_without_balance_is_not_simulated() {
        let session = unreachable_mcp().session();
        let invocations = classify(
            "¿qué pasa si mis gastos aumentan 20%?",
            &UserProfile::new(AccountType::Company, Some("E001")),
        );

        let outcomes = gather(&session, &invocations).await;
        let scenario = outcomes
            .iter()
            .find(|o| o.tool == "simulate_financial_scenario")
            .unwrap();
        assert!(scenario.result.is_none());
        assert!(scenario.args.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_trimmed_and_empty_candidate_falls_back() {
        let driver = Arc::new(RecordingDriver {
            empty: true,
            ..RecordingDriver::default()
        });
        let orchestrator = Orchestrator::new(unreachable_mcp(), Arc::clone(&driver) as Arc<dyn GenerationDriver>, 2);

        let history = (0..5)
            .map(|i| Turn::new(TurnRole::User, format!("turno {i}")))
            .collect();
        let reply = orchestrator
            .respond(ChatTurnRequest {
                message: "hola".to_string(),
                history,
                profile: UserProfile::default(),
            })
            .await
            .unwrap();

        assert_eq!(reply.response, EMPTY_REPLY);
        let seen = driver.seen.lock().unwrap();
        // system + two history turns + message
        assert_eq!(seen[0].len(), 4);
        assert_eq!(seen[0][1].text, "turno 3");
    }
}
