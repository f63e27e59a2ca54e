//! XML configuration support.
//! - Loads a `<config>` document (quick_xml + serde) into [`ClaimConfig`].
//! - Source order: explicit path, then FILE_CLAIM_CONFIG, then the OS default path.
//! - Writes a commented template on request.
//!
//! Notes:
//! - Every value is read as text and trimmed, so indentation inside elements is harmless.
//! - Unknown elements are a hard error to surface typos early.
//! - List values (include, exclude, include_ext, exclude_ext) are comma-separated.

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use super::paths::{default_config_path, path_has_symlink_ancestor};
use super::types::{ClaimConfig, MoveOption};
use crate::platform::atomic_write;

pub const CONFIG_ENV: &str = "FILE_CLAIM_CONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    root: Option<String>,
    read_lock: Option<String>,
    timeout_millis: Option<String>,
    poll_interval_millis: Option<String>,
    use_marker_file: Option<String>,
    delete_orphan_lock_files_on_startup: Option<String>,
    lock_suffix: Option<String>,
    idempotent_key_expression: Option<String>,
    remove_key_on_commit: Option<String>,
    remove_key_on_rollback: Option<String>,
    idempotent_release_delay_millis: Option<String>,
    idempotent_release_async: Option<String>,
    min_age_millis: Option<String>,
    min_length: Option<String>,
    read_lock_min_length: Option<String>,
    skip_log_level: Option<String>,
    pre_move: Option<String>,
    pre_move_prefix: Option<String>,
    pre_move_postfix: Option<String>,
    #[serde(rename = "move")]
    commit_move: Option<String>,
    commit_move_prefix: Option<String>,
    commit_move_postfix: Option<String>,
    move_failed: Option<String>,
    failure_move_prefix: Option<String>,
    failure_move_postfix: Option<String>,
    delete: Option<String>,
    noop: Option<String>,
    include: Option<String>,
    exclude: Option<String>,
    include_regex: Option<String>,
    exclude_regex: Option<String>,
    include_ext: Option<String>,
    exclude_ext: Option<String>,
    recursive: Option<String>,
    max_depth: Option<String>,
    repository: Option<String>,
    repository_path: Option<String>,
    repository_max_entries: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
}

/// Trimmed, non-empty text of an element.
fn text(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parsed<T>(v: &Option<String>, field: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match text(v) {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid value for <{field}>: '{s}' ({e})")),
    }
}

fn list(v: &Option<String>) -> Vec<String> {
    text(v)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn move_option(
    expr: &Option<String>,
    prefix: &Option<String>,
    postfix: &Option<String>,
) -> MoveOption {
    MoveOption {
        expression: text(expr).map(String::from),
        prefix: text(prefix).map(String::from),
        postfix: text(postfix).map(String::from),
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

// Map XmlConfig -> ClaimConfig, starting from defaults.
fn xml_to_config(x: XmlConfig) -> Result<ClaimConfig> {
    let mut cfg = ClaimConfig::default();

    set(&mut cfg.root, text(&x.root).map(PathBuf::from));
    set(&mut cfg.read_lock, parsed(&x.read_lock, "read_lock")?);
    set(&mut cfg.timeout_millis, parsed(&x.timeout_millis, "timeout_millis")?);
    set(&mut cfg.poll_interval_millis, parsed(&x.poll_interval_millis, "poll_interval_millis")?);
    set(&mut cfg.use_marker_file, parsed(&x.use_marker_file, "use_marker_file")?);
    set(
        &mut cfg.delete_orphan_lock_files_on_startup,
        parsed(&x.delete_orphan_lock_files_on_startup, "delete_orphan_lock_files_on_startup")?,
    );
    set(&mut cfg.lock_suffix, text(&x.lock_suffix).map(String::from));
    cfg.idempotent_key_expression = text(&x.idempotent_key_expression).map(String::from);
    set(&mut cfg.remove_key_on_commit, parsed(&x.remove_key_on_commit, "remove_key_on_commit")?);
    set(
        &mut cfg.remove_key_on_rollback,
        parsed(&x.remove_key_on_rollback, "remove_key_on_rollback")?,
    );
    set(
        &mut cfg.idempotent_release_delay_millis,
        parsed(&x.idempotent_release_delay_millis, "idempotent_release_delay_millis")?,
    );
    set(
        &mut cfg.idempotent_release_async,
        parsed(&x.idempotent_release_async, "idempotent_release_async")?,
    );
    set(&mut cfg.min_age_millis, parsed(&x.min_age_millis, "min_age_millis")?);
    set(&mut cfg.min_length, parsed(&x.min_length, "min_length")?);
    set(
        &mut cfg.read_lock_min_length,
        parsed(&x.read_lock_min_length, "read_lock_min_length")?,
    );
    set(&mut cfg.skip_log_level, parsed(&x.skip_log_level, "skip_log_level")?);

    cfg.pre_move = move_option(&x.pre_move, &x.pre_move_prefix, &x.pre_move_postfix);
    cfg.commit_move = move_option(&x.commit_move, &x.commit_move_prefix, &x.commit_move_postfix);
    cfg.failure_move = move_option(&x.move_failed, &x.failure_move_prefix, &x.failure_move_postfix);
    set(&mut cfg.delete, parsed(&x.delete, "delete")?);
    set(&mut cfg.noop, parsed(&x.noop, "noop")?);

    cfg.include = list(&x.include);
    cfg.exclude = list(&x.exclude);
    cfg.include_regex = text(&x.include_regex).map(String::from);
    cfg.exclude_regex = text(&x.exclude_regex).map(String::from);
    cfg.include_ext = list(&x.include_ext);
    cfg.exclude_ext = list(&x.exclude_ext);
    set(&mut cfg.recursive, parsed(&x.recursive, "recursive")?);
    cfg.max_depth = parsed(&x.max_depth, "max_depth")?;

    set(&mut cfg.repository, parsed(&x.repository, "repository")?);
    cfg.repository_path = text(&x.repository_path).map(PathBuf::from);
    set(
        &mut cfg.repository_max_entries,
        parsed(&x.repository_max_entries, "repository_max_entries")?,
    );
    set(&mut cfg.log_level, parsed(&x.log_level, "log_level")?);
    cfg.log_file = text(&x.log_file).map(PathBuf::from);

    Ok(cfg)
}

/// Parse XML text into a ClaimConfig.
pub fn parse_config_xml(contents: &str) -> Result<ClaimConfig> {
    let parsed: XmlConfig = from_xml_str(contents).context("parse config xml")?;
    xml_to_config(parsed)
}

/// Load a ClaimConfig from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<ClaimConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    parse_config_xml(&contents).with_context(|| format!("load config xml '{}'", path.display()))
}

/// If FILE_CLAIM_CONFIG is set, load that file; otherwise Ok(None).
pub fn load_config_from_xml_env() -> Result<Option<ClaimConfig>> {
    match env::var_os(CONFIG_ENV) {
        Some(p) => {
            debug!(path = ?p, "Loading config from {CONFIG_ENV}");
            load_config_from_xml_path(Path::new(&p)).map(Some)
        }
        None => Ok(None),
    }
}

/// Load from the platform default config.xml; Ok(None) if it does not exist.
pub fn load_config_from_default_xml() -> Result<Option<ClaimConfig>> {
    let Some(path) = default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "Loading config from default location");
    load_config_from_xml_path(&path).map(Some)
}

/// Explicit path, then FILE_CLAIM_CONFIG, then the default path, then built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ClaimConfig> {
    if let Some(path) = explicit {
        return load_config_from_xml_path(path);
    }
    if let Some(cfg) = load_config_from_xml_env()? {
        return Ok(cfg);
    }
    Ok(load_config_from_default_xml()?.unwrap_or_default())
}

/// Write a commented template config. Refuses to overwrite or to follow symlinked parents.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Refusing to overwrite existing config {}", path.display());
    }
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    let content = "<!--\n  file_claim configuration (XML). CLI flags override these values.\n\n    read_lock            -> none | markerFile | fileLock | rename | changed |\n                            idempotent | idempotent-changed | idempotent-rename\n    timeout_millis       -> give up waiting after this long (0 = wait forever)\n    poll_interval_millis -> delay between lock attempts\n    read_lock_min_length -> bytes a 'changed' file must hold before it is claimed\n    move / pre_move / move_failed -> directory (relative to the file) or ${...} expression\n    include / exclude    -> comma-separated globs on the path relative to root\n-->\n<config>\n  <root>.</root>\n  <read_lock>markerFile</read_lock>\n  <timeout_millis>10000</timeout_millis>\n  <poll_interval_millis>1000</poll_interval_millis>\n  <use_marker_file>true</use_marker_file>\n  <delete_orphan_lock_files_on_startup>true</delete_orphan_lock_files_on_startup>\n  <move>.done</move>\n  <skip_log_level>debug</skip_log_level>\n  <log_level>normal</log_level>\n</config>\n";

    atomic_write(path, content.as_bytes())
        .with_context(|| format!("write template config '{}'", path.display()))?;
    info!("Created template config at {}", path.display());
    Ok(())
}
