// HTTP routes
pub mod discovery;
pub mod health;
pub mod jobs;
pub mod tracked;
pub mod webhooks;

pub use discovery::*;
pub use health::*;
pub use jobs::*;
pub use tracked::*;
pub use webhooks::*;
