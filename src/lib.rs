//! Finance Chat Agent
//!
//! A conversational finance assistant with two modes:
//! - Stock Analyst: market overviews of NSE-listed equities
//! - Personal Finance Assistant: analysis and charts over an uploaded expense CSV
//!
//! TURN LOOP:
//! USER MESSAGE → ROUTER SHORTCUT? → AGENT (MODEL ⇄ TOOLS) → TRANSCRIPT

pub mod agent;
pub mod api;
pub mod chart;
pub mod config;
pub mod error;
pub mod format;
pub mod gemini;
pub mod llm;
pub mod models;
pub mod router;
pub mod session;
pub mod tools;
pub mod translator;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::{AgentResponse, AgentRole, FinanceAgent};
pub use config::AppConfig;
pub use llm::ChatModel;
pub use models::*;
pub use router::{IntentRouter, Route};
pub use session::{ChatSession, TurnOutput};
pub use translator::ModelAdapter;
