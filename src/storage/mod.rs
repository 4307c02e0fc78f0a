pub mod hybrid;
pub mod migration;
mod models;

pub use hybrid::{HybridStorage, DATA_KEY, SETTINGS_KEY};
pub use migration::SCHEMA_VERSION;
pub use models::*;
