//! Intent Router
//!
//! Keyword shortcuts that answer a prompt by calling a tool directly instead
//! of the model. Rules are checked top to bottom, the first match wins, and
//! anything unmatched falls through to the agent.

use tracing::debug;

use crate::agent::AgentRole;

/// Tickers the stock shortcut recognises.
pub const KNOWN_SYMBOLS: &[&str] = &[
    "INFY", "TCS", "RELIANCE", "HDFCBANK", "ICICIBANK", "SBIN", "ITC", "WIPRO", "AXISBANK", "LT",
    "KOTAKBANK",
];

/// Matched against the lowercased prompt.
const ANALYSIS_KEYWORDS: &[&str] = &["analyze", "summary", "spending", "expenses"];
const CHART_KEYWORDS: &[&str] = &["chart", "visual", "pie"];

pub const INVALID_SYMBOL_MESSAGE: &str =
    "Please specify a valid NSE stock symbol like INFY or RELIANCE.";
pub const UPLOAD_FIRST_MESSAGE: &str =
    "Please upload your CSV file first before requesting analysis.";
pub const CHART_CONFIRMATION: &str = "Here is your pie chart!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Call the stock overview tool for a known ticker.
    StockOverview { symbol: String },
    /// Overview requested but no known ticker in the prompt.
    UnknownSymbol,
    /// Expense question before any file was uploaded.
    UploadRequired,
    AnalyzeExpenses,
    ExpenseChart,
    /// No shortcut applies; ask the agent.
    Agent,
}

/// What a rule gets to look at.
pub struct RouteRequest<'a> {
    pub role: AgentRole,
    pub prompt: &'a str,
    pub has_expenses: bool,
    lowered: String,
}

impl<'a> RouteRequest<'a> {
    pub fn new(role: AgentRole, prompt: &'a str, has_expenses: bool) -> Self {
        Self {
            role,
            prompt,
            has_expenses,
            lowered: prompt.to_lowercase(),
        }
    }

    fn mentions(&self, keyword: &str) -> bool {
        self.lowered.contains(keyword)
    }

    fn mentions_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.mentions(kw))
    }
}

/// A predicate paired with the route it resolves to.
pub struct RouteRule {
    pub name: &'static str,
    pub applies: fn(&RouteRequest<'_>) -> bool,
    pub handle: fn(&RouteRequest<'_>) -> Route,
}

pub static RULES: &[RouteRule] = &[
    RouteRule {
        name: "stock_overview",
        applies: wants_stock_overview,
        handle: resolve_stock_symbol,
    },
    RouteRule {
        name: "upload_required",
        applies: needs_upload,
        handle: upload_required,
    },
    RouteRule {
        name: "analyze_expenses",
        applies: wants_expense_analysis,
        handle: analyze_expenses,
    },
    RouteRule {
        name: "expense_chart",
        applies: wants_expense_chart,
        handle: expense_chart,
    },
];

fn wants_stock_overview(req: &RouteRequest<'_>) -> bool {
    req.role == AgentRole::StockAnalyst && req.mentions("market overview") && req.mentions("nse")
}

fn resolve_stock_symbol(req: &RouteRequest<'_>) -> Route {
    match find_known_symbol(req.prompt) {
        Some(symbol) => Route::StockOverview {
            symbol: symbol.to_string(),
        },
        None => Route::UnknownSymbol,
    }
}

fn needs_upload(req: &RouteRequest<'_>) -> bool {
    req.role == AgentRole::PersonalFinance && !req.has_expenses
}

fn upload_required(_req: &RouteRequest<'_>) -> Route {
    Route::UploadRequired
}

fn wants_expense_analysis(req: &RouteRequest<'_>) -> bool {
    req.role == AgentRole::PersonalFinance && req.mentions_any(ANALYSIS_KEYWORDS)
}

fn analyze_expenses(_req: &RouteRequest<'_>) -> Route {
    Route::AnalyzeExpenses
}

fn wants_expense_chart(req: &RouteRequest<'_>) -> bool {
    req.role == AgentRole::PersonalFinance && req.mentions_any(CHART_KEYWORDS)
}

fn expense_chart(_req: &RouteRequest<'_>) -> Route {
    Route::ExpenseChart
}

/// First whitespace-separated token (uppercased) that is a known ticker.
pub fn find_known_symbol(prompt: &str) -> Option<&'static str> {
    prompt
        .to_uppercase()
        .split_whitespace()
        .find_map(|word| KNOWN_SYMBOLS.iter().copied().find(|known| *known == word))
}

pub struct IntentRouter;

impl IntentRouter {
    pub fn rules() -> &'static [RouteRule] {
        RULES
    }

    /// Pick the route for a prompt.
    pub fn route(req: &RouteRequest<'_>) -> Route {
        for rule in RULES {
            if (rule.applies)(req) {
                let route = (rule.handle)(req);
                debug!(rule = rule.name, ?route, "Shortcut rule matched");
                return route;
            }
        }
        debug!("No shortcut rule matched, deferring to agent");
        Route::Agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(prompt: &str) -> Route {
        IntentRouter::route(&RouteRequest::new(AgentRole::StockAnalyst, prompt, false))
    }

    fn finance(prompt: &str, has_expenses: bool) -> Route {
        IntentRouter::route(&RouteRequest::new(
            AgentRole::PersonalFinance,
            prompt,
            has_expenses,
        ))
    }

    #[test]
    fn test_known_symbol_routes_to_stock_tool() {
        assert_eq!(
            stock("Give me a market overview of INFY on NSE"),
            Route::StockOverview {
                symbol: "INFY".to_string()
            }
        );
        assert_eq!(
            stock("market overview of reliance and tcs on nse"),
            Route::StockOverview {
                symbol: "RELIANCE".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_symbol_gets_fixed_message_route() {
        assert_eq!(stock("Give me a market overview of XYZ on NSE"), Route::UnknownSymbol);
        // punctuation is part of the token
        assert_eq!(stock("Market overview on NSE for INFY?"), Route::UnknownSymbol);
    }

    #[test]
    fn test_stock_prompts_without_both_phrases_go_to_agent() {
        assert_eq!(stock("Show me the stock data for RELIANCE"), Route::Agent);
        assert_eq!(stock("market overview of TCS"), Route::Agent);
        assert_eq!(stock("TCS on NSE"), Route::Agent);
    }

    #[test]
    fn test_finance_requires_upload_first() {
        assert_eq!(finance("analyze my expenses", false), Route::UploadRequired);
        assert_eq!(finance("hello", false), Route::UploadRequired);
    }

    #[test]
    fn test_finance_keywords() {
        assert_eq!(finance("Analyze my expenses from this CSV", true), Route::AnalyzeExpenses);
        assert_eq!(finance("Give me a SUMMARY", true), Route::AnalyzeExpenses);
        assert_eq!(finance("Can you create a pie chart?", true), Route::ExpenseChart);
        assert_eq!(finance("something visual please", true), Route::ExpenseChart);
        // analysis wins over chart
        assert_eq!(finance("chart my spending", true), Route::AnalyzeExpenses);
        assert_eq!(
            finance("How much did I spend on entertainment?", true),
            Route::Agent
        );
    }

    #[test]
    fn test_stock_rule_ignored_in_finance_mode() {
        assert_eq!(
            finance("market overview of INFY on NSE", true),
            Route::Agent
        );
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<&str> = IntentRouter::rules().iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["stock_overview", "upload_required", "analyze_expenses", "expense_chart"]
        );
    }
}
