//! Tool trait and registry
//!
//! Tools are the functions the agent may call. The same functions back the
//! router's keyword shortcuts, which call them directly without the model.

use crate::error::AgentError;
use crate::llm::FunctionDeclaration;
use crate::models::{ToolInput, ToolInvocation, ToolOutput};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod expenses;
pub mod nse;

pub use expenses::{
    analyze_expenses, create_expense_pie_chart, AnalyzeExpensesTool, ChartOutcome,
    ExpensePieChartTool, ExpenseRow, ExpenseTable,
};
pub use nse::{
    get_stock_market_overview, NseQuoteClient, QuoteSource, StockOverview, StockOverviewResult,
    StockOverviewTool,
};

/// Per-call state a tool may read.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The expense table uploaded in the current session, if any.
    pub expenses: Option<Arc<ExpenseTable>>,
}

impl ToolContext {
    pub fn with_expenses(expenses: Option<Arc<ExpenseTable>>) -> Self {
        Self { expenses }
    }
}

/// Trait for a single callable tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, input: &ToolInput, ctx: &ToolContext) -> Result<ToolOutput>;

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function declarations for every registered tool, sorted by name.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        let mut declarations: Vec<FunctionDeclaration> =
            self.tools.values().map(|tool| tool.declaration()).collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    /// Execute a model-requested invocation.
    pub async fn invoke(
        &self,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
    ) -> Result<ToolOutput> {
        let tool = self
            .get(&invocation.tool_name)
            .ok_or_else(|| AgentError::ToolNotFound(invocation.tool_name.clone()))?;

        debug!(tool_name = %invocation.tool_name, "Executing tool");

        let output = tool.execute(&ToolInput::from(invocation), ctx).await?;
        if !output.success {
            warn!(
                tool_name = %invocation.tool_name,
                error = ?output.error,
                "Tool reported failure"
            );
        }

        Ok(output)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tools bound to the stock analyst role.
pub fn stock_analyst_registry(quotes: Arc<dyn QuoteSource>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StockOverviewTool::new(quotes)));
    registry
}

/// Tools bound to the personal finance role.
pub fn personal_finance_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AnalyzeExpensesTool));
    registry.register(Arc::new(ExpensePieChartTool));
    registry
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AgentError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}
