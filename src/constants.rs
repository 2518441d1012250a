/// Default locations used when neither the config file, the environment nor
/// the command line provide one.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DATABASE_PATH: &str = "databases/structural_database.db";
pub const DEFAULT_SOURCE_PATH: &str = "databases/project.veda";
pub const DEFAULT_LOG_DIR: &str = "logs";

// Environment overrides (also read from `.env`)
pub const ENV_DATABASE_PATH: &str = "VEDA_DATABASE_PATH";
pub const ENV_SOURCE_PATH: &str = "VEDA_SOURCE_PATH";
pub const ENV_LOG_DIR: &str = "VEDA_LOG_DIR";
pub const ENV_RULES_FILE: &str = "VEDA_RULES_FILE";

/// Default tracing filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "veda_migrate=info";

// Pipeline stage names, used for log file names and spans
pub const STAGE_CREATE: &str = "create";
pub const STAGE_IMPORT: &str = "import";
pub const STAGE_LINK: &str = "link";
pub const STAGE_VALIDATE: &str = "validate";
pub const STAGE_RUN: &str = "run";

/// Get all pipeline stages in dependency order
pub fn pipeline_stages() -> Vec<&'static str> {
    vec![STAGE_CREATE, STAGE_IMPORT, STAGE_LINK]
}
