//! Personal expense tables, category analysis and the pie chart tool
//!
//! All functions here borrow the table; uploaded data is never modified.
//! Rows whose `Amount` does not parse as a finite number are ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use super::{ensure_object_parameters, Tool, ToolContext};
use crate::chart::PieChart;
use crate::error::AgentError;
use crate::format;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;

pub const CATEGORY_COLUMN: &str = "Category";
pub const AMOUNT_COLUMN: &str = "Amount";
pub const DATE_COLUMN: &str = "Date";
pub const DESCRIPTION_COLUMN: &str = "Description";

pub const ANALYSIS_COLUMNS_ERROR: &str =
    "Error: DataFrame must have 'Category' and 'Amount' columns for analysis.";
pub const CHART_COLUMNS_ERROR: &str =
    "Error: DataFrame must have 'Category' and 'Amount' columns for chart.";
pub const CHART_TITLE: &str = "Expense Distribution by Category";

const TOP_CATEGORIES: usize = 5;

/// One row with a valid amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRow {
    pub date: Option<String>,
    pub category: String,
    pub amount: f64,
    pub description: Option<String>,
}

/// Uploaded tabular data, kept as text cells under named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseTable {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl ExpenseTable {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    /// Parse CSV with a header row.
    ///
    /// Short rows are padded with blank cells; rows wider than the header are
    /// rejected.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(AgentError::MalformedCsv(
                "No columns to parse from file".to_string(),
            ));
        }

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Err(AgentError::MalformedCsv(format!(
                    "Expected {} fields in line {}, saw {}",
                    headers.len(),
                    line,
                    record.len()
                )));
            }
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(headers.len(), String::new());
            records.push(cells);
        }

        Ok(Self { headers, records })
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether `Category` and `Amount` are both present.
    pub fn has_required_columns(&self) -> bool {
        self.has_column(CATEGORY_COLUMN) && self.has_column(AMOUNT_COLUMN)
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Rows with a parseable amount, in file order. `None` when the
    /// `Category` or `Amount` column is missing.
    pub fn rows(&self) -> Option<Vec<ExpenseRow>> {
        let category = self.column(CATEGORY_COLUMN)?;
        let amount = self.column(AMOUNT_COLUMN)?;
        let date = self.column(DATE_COLUMN);
        let description = self.column(DESCRIPTION_COLUMN);

        let cell = |record: &Vec<String>, idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .filter(|v| !v.trim().is_empty())
                .cloned()
        };

        Some(
            self.records
                .iter()
                .filter_map(|record| {
                    let value = coerce_amount(record.get(amount)?)?;
                    Some(ExpenseRow {
                        date: cell(record, date),
                        category: record.get(category).cloned().unwrap_or_default(),
                        amount: value,
                        description: cell(record, description),
                    })
                })
                .collect(),
        )
    }

    /// Summed amounts per category, ordered by category name.
    /// Rows with a blank category are not grouped.
    pub fn category_totals(&self) -> Option<Vec<(String, f64)>> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for row in self.rows()? {
            if row.category.trim().is_empty() {
                continue;
            }
            *totals.entry(row.category).or_insert(0.0) += row.amount;
        }
        Some(totals.into_iter().collect())
    }
}

/// Numeric coercion of an amount cell. Blank, non-numeric and non-finite
/// values yield `None`.
pub fn coerce_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Top five categories by total spend as a bulleted list.
pub fn analyze_expenses(table: &ExpenseTable) -> String {
    let Some(mut totals) = table.category_totals() else {
        return ANALYSIS_COLUMNS_ERROR.to_string();
    };

    // stable: equal totals keep category order
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut analysis = String::from("Here are your largest expense categories:\n");
    for (category, total) in totals.iter().take(TOP_CATEGORIES) {
        analysis.push_str(&format!("- {}: {}\n", category, format::rupees(*total)));
    }

    analysis
}

/// Result of the chart function: a chart, or a message to show instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChartOutcome {
    Chart(PieChart),
    Message { text: String },
}

/// Pie chart of spend per category.
pub fn create_expense_pie_chart(table: &ExpenseTable) -> ChartOutcome {
    match table.category_totals() {
        Some(totals) => ChartOutcome::Chart(PieChart::from_totals(CHART_TITLE, &totals)),
        None => ChartOutcome::Message {
            text: CHART_COLUMNS_ERROR.to_string(),
        },
    }
}

fn expense_parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "csv": {
                "type": "string",
                "description": "Optional CSV text with Category and Amount columns. Defaults to the uploaded expense file."
            }
        }
    })
}

/// Table from an inline `csv` argument, falling back to the session upload.
fn resolve_table(input: &ToolInput, ctx: &ToolContext) -> Result<Arc<ExpenseTable>> {
    ensure_object_parameters(input)?;

    if let Some(text) = input.parameters.get("csv").and_then(Value::as_str) {
        return Ok(Arc::new(ExpenseTable::from_csv_str(text)?));
    }

    ctx.expenses.clone().ok_or_else(|| {
        AgentError::InvalidToolInput(
            "No expense data available: upload a CSV file or pass 'csv'".to_string(),
        )
    })
}

pub struct AnalyzeExpensesTool;

#[async_trait]
impl Tool for AnalyzeExpensesTool {
    fn name(&self) -> &'static str {
        "analyze_expenses"
    }

    fn description(&self) -> &'static str {
        "Analyzes an expense table with 'Category' and 'Amount' columns and returns the top 5 categories by amount."
    }

    fn parameters_schema(&self) -> Value {
        expense_parameters_schema()
    }

    async fn execute(&self, input: &ToolInput, ctx: &ToolContext) -> Result<ToolOutput> {
        let table = resolve_table(input, ctx)?;
        let summary = analyze_expenses(&table);

        Ok(if table.has_required_columns() {
            ToolOutput::ok(json!({ "summary": summary }))
        } else {
            ToolOutput::failed(summary)
        })
    }
}

pub struct ExpensePieChartTool;

#[async_trait]
impl Tool for ExpensePieChartTool {
    fn name(&self) -> &'static str {
        "create_expense_pie_chart"
    }

    fn description(&self) -> &'static str {
        "Creates a pie chart of expenses by category from an expense table."
    }

    fn parameters_schema(&self) -> Value {
        expense_parameters_schema()
    }

    async fn execute(&self, input: &ToolInput, ctx: &ToolContext) -> Result<ToolOutput> {
        let table = resolve_table(input, ctx)?;

        Ok(match create_expense_pie_chart(&table) {
            ChartOutcome::Chart(chart) => ToolOutput::ok(json!({
                "message": crate::router::CHART_CONFIRMATION,
                "chart": chart,
            })),
            ChartOutcome::Message { text } => ToolOutput::failed(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Date,Category,Amount,Description\n\
        2025-07-01,Food,100,Groceries\n\
        2025-07-02,Food,50,Snacks\n\
        2025-07-03,Travel,30,Bus\n";

    #[test]
    fn test_analysis_ranks_categories() {
        let table = ExpenseTable::from_csv_str(SAMPLE).unwrap();
        let analysis = analyze_expenses(&table);

        assert_eq!(
            analysis,
            "Here are your largest expense categories:\n- Food: ₹150.00\n- Travel: ₹30.00\n"
        );
        let food = analysis.find("Food: ₹150.00").unwrap();
        let travel = analysis.find("Travel: ₹30.00").unwrap();
        assert!(food < travel);
    }

    #[test]
    fn test_invalid_amounts_are_dropped_without_touching_input() {
        let table = ExpenseTable::from_csv_str(
            "Category,Amount\nFood,100\nFood,abc\nRent,\nRent,25000.5\nMisc,nan\n",
        )
        .unwrap();
        let before = table.clone();

        let analysis = analyze_expenses(&table);

        assert_eq!(
            analysis,
            "Here are your largest expense categories:\n- Rent: ₹25,000.50\n- Food: ₹100.00\n"
        );
        assert_eq!(table, before);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_only_top_five_categories() {
        let mut csv = String::from("Category,Amount\n");
        for (i, name) in ["A", "B", "C", "D", "E", "F", "G"].iter().enumerate() {
            csv.push_str(&format!("{},{}\n", name, (i + 1) * 10));
        }
        let table = ExpenseTable::from_csv_str(&csv).unwrap();

        let analysis = analyze_expenses(&table);

        assert_eq!(analysis.lines().count(), 6);
        assert!(analysis.contains("- G: ₹70.00"));
        assert!(!analysis.contains("- B:"));
    }

    #[test]
    fn test_missing_amount_column_errors() {
        let table = ExpenseTable::from_csv_str("Date,Category,Cost\n2025-07-01,Food,10\n").unwrap();

        assert_eq!(analyze_expenses(&table), ANALYSIS_COLUMNS_ERROR);
        assert_eq!(
            create_expense_pie_chart(&table),
            ChartOutcome::Message {
                text: CHART_COLUMNS_ERROR.to_string()
            }
        );
    }

    #[test]
    fn test_chart_slices_follow_category_order() {
        let table = ExpenseTable::from_csv_str(SAMPLE).unwrap();

        let ChartOutcome::Chart(chart) = create_expense_pie_chart(&table) else {
            panic!("expected a chart");
        };

        assert_eq!(chart.title, CHART_TITLE);
        let labels: Vec<&str> = chart.slices.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Food", "Travel"]);
        assert_eq!(chart.slices[0].percent_label, "83.3%");
    }

    #[test]
    fn test_rows_keep_optional_columns() {
        let table = ExpenseTable::from_csv_str(SAMPLE).unwrap();
        let rows = table.rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date.as_deref(), Some("2025-07-01"));
        assert_eq!(rows[2].description.as_deref(), Some("Bus"));
    }

    #[test]
    fn test_malformed_csv_is_error() {
        let err = ExpenseTable::from_csv_str("Category,Amount\nFood,10,extra\n").unwrap_err();
        assert!(err.to_string().starts_with("Failed to read CSV:"));

        let err = ExpenseTable::from_csv_str("").unwrap_err();
        assert!(err.to_string().starts_with("Failed to read CSV:"));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = ExpenseTable::from_csv_str(
            "Date,Category,Amount,Description\n2025-07-01,Food,100,Groceries\n2025-07-02,Travel,30\n",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        let rows = table.rows().unwrap();
        assert!(rows[1].description.is_none());
        assert_eq!(
            analyze_expenses(&table),
            "Here are your largest expense categories:\n- Food: ₹100.00\n- Travel: ₹30.00\n"
        );
    }

    #[test]
    fn test_wide_rows_are_rejected() {
        let err = ExpenseTable::from_csv_str("Category,Amount\nFood,10\nRent,5,extra\n").unwrap_err();
        assert!(matches!(err, AgentError::MalformedCsv(_)));
        assert_eq!(
            err.to_string(),
            "Failed to read CSV: Expected 2 fields in line 3, saw 3"
        );
    }

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount(" 12.5 "), Some(12.5));
        assert_eq!(coerce_amount("-3"), Some(-3.0));
        assert_eq!(coerce_amount("1,000"), None);
        assert_eq!(coerce_amount("inf"), None);
        assert_eq!(coerce_amount(""), None);
    }

    #[tokio::test]
    async fn test_tools_use_session_table() {
        let ctx = ToolContext::with_expenses(Some(Arc::new(
            ExpenseTable::from_csv_str(SAMPLE).unwrap(),
        )));
        let input = ToolInput {
            tool_name: "analyze_expenses".to_string(),
            parameters: json!({}),
        };

        let output = AnalyzeExpensesTool.execute(&input, &ctx).await.unwrap();
        assert!(output.success);
        assert!(output.data["summary"]
            .as_str()
            .unwrap()
            .contains("Food: ₹150.00"));

        let output = ExpensePieChartTool.execute(&input, &ctx).await.unwrap();
        assert!(output.success);
        assert_eq!(output.data["chart"]["slices"][1]["label"], "Travel");
    }

    #[tokio::test]
    async fn test_tools_accept_inline_csv_and_require_data() {
        let inline = ToolInput {
            tool_name: "analyze_expenses".to_string(),
            parameters: json!({"csv": "Category,Cost\nFood,1\n"}),
        };
        let output = AnalyzeExpensesTool
            .execute(&inline, &ToolContext::default())
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some(ANALYSIS_COLUMNS_ERROR));

        let empty = ToolInput {
            tool_name: "create_expense_pie_chart".to_string(),
            parameters: json!({}),
        };
        let err = ExpensePieChartTool
            .execute(&empty, &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolInput(_)));
    }
}
