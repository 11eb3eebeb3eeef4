//! Agent orchestrator
//!
//! Binds a model adapter, a role's tool registry and its system prompt into
//! one callable. The role is fixed at construction.
//!
//! PROMPT → MODEL → TOOL CALLS? → MODEL → ANSWER

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chart::PieChart;
use crate::error::AgentError;
use crate::llm::{ChatModel, FunctionDeclaration};
use crate::models::{ChatMessage, ToolInvocation, ToolOutput};
use crate::tools::{self, QuoteSource, ToolContext, ToolRegistry};
use crate::translator::ModelAdapter;
use crate::Result;

/// Upper bound on model turns spent executing tool calls for one prompt.
pub const MAX_TOOL_ROUNDS: u32 = 3;

const STOCK_ANALYST_PROMPT: &str = "You are a data-driven Stock Market Analyst agent. Your ONLY \
way to access financial data is by using the tools you have been given. You have no prior \
knowledge. When a user asks for information about a stock, you MUST call the correct tool. \
NEVER apologize or say you cannot access real-time data. After the tool returns the real data, \
you MUST use that data to synthesize a concise, well-structured report in Markdown format.";

const PERSONAL_FINANCE_PROMPT: &str = "You are a friendly and encouraging Personal Finance & \
Budgeting Assistant. The user's uploaded expense file is available to your tools: call \
analyze_expenses for category totals and create_expense_pie_chart for a visual breakdown. \
Base every figure you quote on tool results, and keep advice practical and concise.";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    #[default]
    StockAnalyst,
    PersonalFinance,
}

impl AgentRole {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::StockAnalyst => STOCK_ANALYST_PROMPT,
            AgentRole::PersonalFinance => PERSONAL_FINANCE_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRole::StockAnalyst => "Stock Analyst",
            AgentRole::PersonalFinance => "Personal Finance Assistant",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AgentRole {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "stock" | "stock analyst" | "stock market analyst" => Ok(AgentRole::StockAnalyst),
            "finance" | "personal finance" | "personal finance assistant" => {
                Ok(AgentRole::PersonalFinance)
            }
            other => Err(AgentError::ConfigError(format!("Unknown agent role: {}", other))),
        }
    }
}

/// Answer from one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    /// Tool calls executed while producing the answer, in order.
    pub tool_calls: Vec<ToolInvocation>,
    /// Chart produced by a chart tool during the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<PieChart>,
    /// Number of model calls made.
    pub model_calls: u32,
}

pub struct FinanceAgent {
    role: AgentRole,
    adapter: ModelAdapter,
    tools: ToolRegistry,
    declarations: Vec<FunctionDeclaration>,
    system_prompt: &'static str,
}

impl FinanceAgent {
    pub fn new(role: AgentRole, adapter: ModelAdapter, tools: ToolRegistry) -> Self {
        let declarations = tools.declarations();
        Self {
            role,
            adapter,
            tools,
            declarations,
            system_prompt: role.system_prompt(),
        }
    }

    /// Build the agent for `role` with that role's tools and prompt.
    pub fn for_role(
        role: AgentRole,
        model: Arc<dyn ChatModel>,
        quotes: Arc<dyn QuoteSource>,
    ) -> Self {
        let registry = match role {
            AgentRole::StockAnalyst => tools::stock_analyst_registry(quotes),
            AgentRole::PersonalFinance => tools::personal_finance_registry(),
        };
        Self::new(role, ModelAdapter::new(model), registry)
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `prompt`, executing requested tool calls and feeding their
    /// results back to the model for at most [`MAX_TOOL_ROUNDS`] rounds.
    ///
    /// Model errors are returned; tool failures are reported to the model.
    pub async fn run(&self, prompt: &str, ctx: &ToolContext) -> Result<AgentResponse> {
        info!(
            role = %self.role,
            model = self.adapter.model_id(),
            provider = self.adapter.provider(),
            "Agent run started"
        );

        let mut messages = vec![
            ChatMessage::system(self.system_prompt),
            ChatMessage::user(prompt),
        ];
        let mut executed = Vec::new();
        let mut chart = None;
        let mut model_calls = 0;

        loop {
            let reply = self.adapter.respond(&messages, &self.declarations).await?;
            model_calls += 1;

            if !reply.has_tool_calls() {
                debug!(model_calls, "Agent run finished");
                return Ok(AgentResponse {
                    content: reply.content().to_string(),
                    tool_calls: executed,
                    chart,
                    model_calls,
                });
            }

            if model_calls > MAX_TOOL_ROUNDS {
                warn!(
                    model_calls,
                    "Tool round limit reached, returning last model content"
                );
                return Ok(AgentResponse {
                    content: reply.content().to_string(),
                    tool_calls: executed,
                    chart,
                    model_calls,
                });
            }

            messages.push(ChatMessage::assistant(describe_calls(
                reply.content(),
                reply.tool_invocations(),
            )));

            for invocation in reply.tool_invocations() {
                let output = self.tools.invoke(invocation, ctx).await;
                if let Some(produced) = chart_from(&output) {
                    chart = Some(produced);
                }
                messages.push(ChatMessage::user(format!(
                    "Result of tool `{}`:\n{}",
                    invocation.tool_name,
                    tool_result_text(invocation, output)
                )));
                executed.push(invocation.clone());
            }
        }
    }
}

/// Text handed back to the model for one tool call. Failures are folded in
/// rather than aborting the run.
fn tool_result_text(invocation: &ToolInvocation, output: Result<ToolOutput>) -> String {
    match output {
        Ok(ToolOutput {
            success: true,
            data,
            ..
        }) => render_tool_data(&data),
        Ok(ToolOutput { error, data, .. }) => {
            format!("Error: {}", error.unwrap_or_else(|| render_tool_data(&data)))
        }
        Err(e) => {
            warn!(tool_name = %invocation.tool_name, error = %e, "Tool call failed");
            format!("Error: {}", e)
        }
    }
}

fn chart_from(output: &Result<ToolOutput>) -> Option<PieChart> {
    match output {
        Ok(out) if out.success => out
            .data
            .get("chart")
            .and_then(|chart| serde_json::from_value(chart.clone()).ok()),
        _ => None,
    }
}

fn render_tool_data(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Text standing in for the model's tool-call turn in the next request.
fn describe_calls(content: &str, invocations: &[ToolInvocation]) -> String {
    let calls: Vec<String> = invocations
        .iter()
        .map(|inv| {
            format!(
                "{}({})",
                inv.tool_name,
                Value::Object(inv.arguments.clone())
            )
        })
        .collect();

    if content.trim().is_empty() {
        format!("Calling tools: {}", calls.join(", "))
    } else {
        format!("{}\n\nCalling tools: {}", content, calls.join(", "))
    }
}
