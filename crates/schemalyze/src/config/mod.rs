pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, apply_stage_overrides, default_config_path, load_config,
    load_config_from_str, load_service_config, validate_config,
};
pub use schema::{ServiceConfig, StageRetryConfig};
