use finance_chat_agent::{
    agent::AgentRole, config::AppConfig, gemini::GeminiClient, session::ChatSession,
    tools::NseQuoteClient,
};
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const CHART_PATH: &str = "expense_chart.svg";

const HELP: &str = "Commands:\n  \
    /mode stock|finance   switch assistant (clears the conversation)\n  \
    /upload <path>        load an expense CSV (Date, Category, Amount, Description)\n  \
    /quit                 exit";

enum Command<'a> {
    Mode(&'a str),
    Upload(&'a str),
    Help,
    Quit,
    Chat(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/mode" => Command::Mode(rest),
        "/upload" => Command::Upload(rest),
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Chat(line),
    }
}

fn prompt(session: &ChatSession) {
    print!("[{}] > ", session.role());
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Logs go to stderr so they don't interleave with answers
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; questions that reach the model will fail");
    }

    let role = match std::env::args().nth(1) {
        Some(mode) => AgentRole::from_str(&mode)?,
        None => AgentRole::default(),
    };

    let model = Arc::new(GeminiClient::from_config(&config)?);
    let quotes = Arc::new(NseQuoteClient::new(&config.nse_base_url, config.http_timeout)?);
    let mut session = ChatSession::new(role, model, quotes);
    info!(session_id = %session.id(), "Terminal chat started");

    println!("AI Financial Assistant ({})", session.role());
    println!("{}\n", HELP);
    prompt(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Mode(mode) => match AgentRole::from_str(mode) {
                Ok(role) => {
                    if session.switch_role(role) {
                        println!("Switched to {}. Conversation cleared.", role);
                    } else {
                        println!("Already in {} mode.", role);
                    }
                }
                Err(e) => println!("{}", e),
            },
            Command::Upload(path) if path.is_empty() => println!("Usage: /upload <path>"),
            Command::Upload(path) => match tokio::fs::read(path).await {
                Ok(bytes) => match session.upload_csv(&bytes) {
                    Ok(rows) => println!("Loaded {} rows from {}.", rows, path),
                    Err(e) => println!("{}", e),
                },
                Err(e) => println!("Could not open {}: {}", path, e),
            },
            Command::Chat("") => {}
            Command::Chat(message) => match session.send(message).await {
                Ok(turn) => {
                    println!("\n{}\n", turn.answer);
                    if let Some(chart) = turn.chart {
                        tokio::fs::write(CHART_PATH, chart.to_svg()).await?;
                        println!("(chart saved to {})\n", CHART_PATH);
                    }
                }
                Err(e) => println!("\nError: {}\n", e),
            },
        }
        prompt(&session);
    }

    Ok(())
}
