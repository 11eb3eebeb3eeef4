//! Chat session state and the turn handler
//!
//! A session owns the active role, the transcript, the uploaded expense table
//! and the agent bound to the role. Each turn is routed through the keyword
//! shortcuts first and reaches the model only when none applies.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{AgentRole, FinanceAgent};
use crate::chart::PieChart;
use crate::llm::ChatModel;
use crate::models::ChatMessage;
use crate::router::{
    IntentRouter, Route, RouteRequest, CHART_CONFIRMATION, INVALID_SYMBOL_MESSAGE,
    UPLOAD_FIRST_MESSAGE,
};
use crate::tools::{
    analyze_expenses, create_expense_pie_chart, get_stock_market_overview, ChartOutcome,
    ExpenseTable, QuoteSource, ToolContext,
};
use crate::Result;

/// What one turn hands back to the user.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutput {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<PieChart>,
}

impl TurnOutput {
    fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            chart: None,
        }
    }
}

pub struct ChatSession {
    id: Uuid,
    role: AgentRole,
    transcript: Vec<ChatMessage>,
    expenses: Option<Arc<ExpenseTable>>,
    agent: FinanceAgent,
    model: Arc<dyn ChatModel>,
    quotes: Arc<dyn QuoteSource>,
}

impl ChatSession {
    pub fn new(role: AgentRole, model: Arc<dyn ChatModel>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self::with_id(Uuid::new_v4(), role, model, quotes)
    }

    pub fn with_id(
        id: Uuid,
        role: AgentRole,
        model: Arc<dyn ChatModel>,
        quotes: Arc<dyn QuoteSource>,
    ) -> Self {
        info!(session_id = %id, role = %role, "Session created");
        Self {
            id,
            role,
            transcript: Vec::new(),
            expenses: None,
            agent: FinanceAgent::for_role(role, model.clone(), quotes.clone()),
            model,
            quotes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn expenses(&self) -> Option<&ExpenseTable> {
        self.expenses.as_deref()
    }

    /// Switch to `role`. Returns `false` when it is already active.
    ///
    /// A change starts a fresh conversation: transcript and uploaded table are
    /// cleared and a new agent is bound.
    pub fn switch_role(&mut self, role: AgentRole) -> bool {
        if role == self.role {
            return false;
        }

        info!(session_id = %self.id, from = %self.role, to = %role, "Switching role");
        self.role = role;
        self.transcript.clear();
        self.expenses = None;
        self.agent = FinanceAgent::for_role(role, self.model.clone(), self.quotes.clone());
        true
    }

    /// Replace the uploaded table with `bytes` parsed as CSV.
    ///
    /// On failure the previous table is dropped and the error is returned; its
    /// message reads `Failed to read CSV: ...`.
    pub fn upload_csv(&mut self, bytes: &[u8]) -> Result<usize> {
        match ExpenseTable::from_reader(bytes) {
            Ok(table) => {
                let rows = table.len();
                info!(session_id = %self.id, rows, columns = ?table.headers(), "Expense table uploaded");
                self.expenses = Some(Arc::new(table));
                Ok(rows)
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Expense upload rejected");
                self.expenses = None;
                Err(e)
            }
        }
    }

    /// Handle one user turn.
    ///
    /// The user message is recorded before anything else. Model errors are
    /// returned and leave no assistant message behind.
    pub async fn send(&mut self, prompt: &str) -> Result<TurnOutput> {
        self.transcript.push(ChatMessage::user(prompt));

        let request = RouteRequest::new(self.role, prompt, self.expenses.is_some());
        let route = IntentRouter::route(&request);
        debug!(session_id = %self.id, ?route, "Turn routed");

        let output = self.dispatch(route, prompt).await?;

        let stored = if output.chart.is_some() && output.answer.is_empty() {
            CHART_CONFIRMATION.to_string()
        } else {
            output.answer.clone()
        };
        self.transcript.push(ChatMessage::assistant(stored));

        Ok(output)
    }

    async fn dispatch(&self, route: Route, prompt: &str) -> Result<TurnOutput> {
        match route {
            Route::StockOverview { symbol } => {
                let overview = get_stock_market_overview(self.quotes.as_ref(), &symbol).await;
                Ok(TurnOutput::text(overview.to_markdown()))
            }
            Route::UnknownSymbol => Ok(TurnOutput::text(INVALID_SYMBOL_MESSAGE)),
            Route::UploadRequired => Ok(TurnOutput::text(UPLOAD_FIRST_MESSAGE)),
            Route::AnalyzeExpenses => Ok(TurnOutput::text(self.with_table(analyze_expenses))),
            Route::ExpenseChart => Ok(match self.with_table(create_expense_pie_chart) {
                ChartOutcome::Chart(chart) => TurnOutput {
                    answer: CHART_CONFIRMATION.to_string(),
                    chart: Some(chart),
                },
                ChartOutcome::Message { text } => TurnOutput::text(text),
            }),
            Route::Agent => {
                let ctx = ToolContext::with_expenses(self.expenses.clone());
                let response = self.agent.run(prompt, &ctx).await?;
                Ok(TurnOutput {
                    answer: response.content,
                    chart: response.chart,
                })
            }
        }
    }

    fn with_table<T>(&self, f: fn(&ExpenseTable) -> T) -> T {
        // routes needing a table are only chosen once one is uploaded
        match &self.expenses {
            Some(table) => f(table),
            None => f(&ExpenseTable::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::{ClientReply, ClientToolCall};
    use crate::models::ChatRole;
    use crate::tools::expenses::ANALYSIS_COLUMNS_ERROR;
    use crate::tools::nse::testing::{infy_quote, StaticQuotes};
    use serde_json::json;

    const SAMPLE: &str = "Date,Category,Amount,Description\n\
        2025-07-01,Food,100,Groceries\n\
        2025-07-02,Food,50,Snacks\n\
        2025-07-03,Travel,30,Bus\n";

    fn new_session(role: AgentRole, model: Arc<ScriptedModel>) -> (ChatSession, Arc<StaticQuotes>) {
        let quotes = Arc::new(StaticQuotes::with("INFY", infy_quote()));
        (ChatSession::new(role, model, quotes.clone()), quotes)
    }

    #[tokio::test]
    async fn test_stock_shortcut_bypasses_model() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, quotes) = new_session(AgentRole::StockAnalyst, model.clone());

        let out = session
            .send("Give me a market overview of INFY on NSE")
            .await
            .unwrap();

        assert!(out.answer.contains("**Company Name:** Infosys Limited"));
        assert!(out.answer.contains("**Market Cap (Cr):** 10.00"));
        assert_eq!(model.call_count(), 0);
        assert_eq!(quotes.request_count(), 1);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript()[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_symbol_message() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, quotes) = new_session(AgentRole::StockAnalyst, model.clone());

        let out = session
            .send("Give me a market overview of XYZ on NSE")
            .await
            .unwrap();

        assert_eq!(out.answer, INVALID_SYMBOL_MESSAGE);
        assert_eq!(model.call_count(), 0);
        assert_eq!(quotes.request_count(), 0);
    }

    #[tokio::test]
    async fn test_finance_requires_upload() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model.clone());

        let out = session.send("analyze my expenses").await.unwrap();

        assert_eq!(out.answer, UPLOAD_FIRST_MESSAGE);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_finance_shortcuts_after_upload() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model.clone());
        assert_eq!(session.upload_csv(SAMPLE.as_bytes()).unwrap(), 3);

        let out = session.send("Analyze my expenses").await.unwrap();
        assert!(out.answer.contains("- Food: ₹150.00"));
        assert!(out.chart.is_none());

        let out = session.send("show me a pie chart").await.unwrap();
        assert_eq!(out.answer, CHART_CONFIRMATION);
        assert_eq!(out.chart.unwrap().slices.len(), 2);
        assert_eq!(
            session.transcript().last().unwrap().content,
            CHART_CONFIRMATION
        );
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_column_message_is_stored_as_is() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model);
        session
            .upload_csv(b"Date,Category,Cost\n2025-07-01,Food,10\n")
            .unwrap();

        let out = session.send("summary please").await.unwrap();

        assert_eq!(out.answer, ANALYSIS_COLUMNS_ERROR);
        assert_eq!(
            session.transcript().last().unwrap().content,
            ANALYSIS_COLUMNS_ERROR
        );
    }

    #[tokio::test]
    async fn test_bad_upload_clears_table() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model);
        session.upload_csv(SAMPLE.as_bytes()).unwrap();

        let err = session.upload_csv(b"Category,Amount\nFood,1,2\n").unwrap_err();

        assert!(err.to_string().starts_with("Failed to read CSV:"));
        assert!(session.expenses().is_none());
    }

    #[tokio::test]
    async fn test_agent_fallthrough_records_reply() {
        let model = Arc::new(ScriptedModel::text("Markets were calm today."));
        let (mut session, _) = new_session(AgentRole::StockAnalyst, model.clone());

        let out = session.send("How is the market?").await.unwrap();

        assert_eq!(out.answer, "Markets were calm today.");
        assert_eq!(model.call_count(), 1);
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_agent_chart_is_returned() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ClientReply {
                content: String::new(),
                tool_calls: vec![ClientToolCall {
                    name: "create_expense_pie_chart".to_string(),
                    args: json!({}),
                }],
            }),
            Ok(ClientReply {
                content: "Food dominates your spending.".to_string(),
                tool_calls: vec![],
            }),
        ]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model.clone());
        session.upload_csv(SAMPLE.as_bytes()).unwrap();

        let out = session.send("How does food compare to travel?").await.unwrap();

        assert_eq!(out.answer, "Food dominates your spending.");
        assert_eq!(out.chart.unwrap().slices[0].label, "Food");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_model_error_keeps_user_message_only() {
        let model = Arc::new(ScriptedModel::new(vec![Err(AgentError::LlmError(
            "quota exceeded".to_string(),
        ))]));
        let (mut session, _) = new_session(AgentRole::StockAnalyst, model);

        let err = session.send("Tell me about TCS").await.unwrap_err();

        assert!(err.is_llm_failure());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_switch_role_resets_conversation() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut session, _) = new_session(AgentRole::PersonalFinance, model);
        session.upload_csv(SAMPLE.as_bytes()).unwrap();
        session.send("summary").await.unwrap();

        assert!(!session.switch_role(AgentRole::PersonalFinance));
        assert_eq!(session.transcript().len(), 2);

        assert!(session.switch_role(AgentRole::StockAnalyst));
        assert_eq!(session.role(), AgentRole::StockAnalyst);
        assert!(session.transcript().is_empty());
        assert!(session.expenses().is_none());
        assert_eq!(session.agent.role(), AgentRole::StockAnalyst);
    }
}
