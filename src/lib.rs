pub mod answerer;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod extractor;
pub mod invoker;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod response_parser;
pub mod throttle;
pub mod true_false;
pub mod utils;

pub use error::{QuizError, Result};
pub use model::{EntityKind, QuestionRecord, QuestionType, TtpRecord, WorkItem};
pub use orchestrator::{Orchestrator, RunReport, RunSummary};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "ttp_quiz=info";

pub fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

// Load env from a simple, standardized location resolution.
// Honors TTPQ_ENV_FILE, otherwise loads .env if present and silently ignores if missing.
pub fn load_env() {
    match std::env::var("TTPQ_ENV_FILE") {
        Ok(path) => {
            let _ = dotenvy::from_path(path);
        }
        Err(_) => {
            let _ = dotenvy::dotenv();
        }
    }
}
