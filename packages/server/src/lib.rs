// Scrape orchestration server
//
// Hosts the job workers, the webhook drainer and the recurring trigger on
// top of `scrape_core`, and exposes the submission API over HTTP.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
