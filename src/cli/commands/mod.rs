mod ask;
mod chat;
mod common;
mod config;
mod status;
mod summarize;

pub use ask::AskArgs;
pub use chat::ChatArgs;
pub use config::ConfigCommand;
pub use summarize::SummarizeArgs;

pub use ask::handle_ask;
pub use chat::handle_chat;
pub use config::handle_config;
pub use status::handle_status;
pub use summarize::handle_summarize;
