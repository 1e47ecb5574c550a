pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod source;
pub mod store;
pub mod upsert;
