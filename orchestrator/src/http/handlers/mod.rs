mod health;
mod modules;
mod query;
mod routing_config;

pub use health::health;
pub use modules::{build_module, delete_module, get_module, list_modules, module_action};
pub use query::{get_metrics, query};
pub use routing_config::{delete_category, get_routing_config, put_routing_config, reload_routing_config, upsert_category};
