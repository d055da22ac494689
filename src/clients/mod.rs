pub mod openai;
pub mod traits;

pub use openai::OpenAiClient;
pub use traits::{AgentError, ChatMessage, CompletionClient, CompletionRequest, Role};
