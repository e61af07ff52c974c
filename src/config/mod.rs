pub mod settings;
pub mod yaml_config;
