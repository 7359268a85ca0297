pub mod database;
pub mod gateway;
pub mod metrics;

pub use database::Database;
pub use gateway::GatewayClient;
pub use metrics::{get_metrics, init_metrics};
