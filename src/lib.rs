pub mod api;
pub mod clock;
pub mod config;
pub mod errors;
pub mod generate;
pub mod hosting;
pub mod llm;
pub mod logging;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod retry;
pub mod server;
pub mod watcher;

#[cfg(test)]
mod testutil;
