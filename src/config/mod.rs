//! Config module.
//! Provides configuration types, default paths, XML loading, validation, and
//! assembly of the runtime strategy from a config.

mod build;
pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{ClaimConfig, LogLevel, MoveOption, ReadLockKind, RepositoryKind, SkipLogLevel};
pub use xml::{
    CONFIG_ENV, create_template_config, load_config_from_default_xml, load_config_from_xml_env,
    load_config_from_xml_path, parse_config_xml, resolve_config,
};
