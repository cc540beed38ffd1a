use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::config::FileConfig;

pub const CONFIG_FILE_NAME: &str = "watcher.yml";
pub const DOTENV_FILE_NAME: &str = ".env";

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Error reading config file {path:?}"))?;

    load_config_str(&content)
}

pub fn load_config_str(content: &str) -> Result<FileConfig> {
    // an empty file is a valid "all defaults" config
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    let mut config: FileConfig =
        serde_yaml::from_str(content).with_context(|| "Error parsing YAML configuration file")?;

    resolve_env(&mut config)?;
    check_commands(&config)?;

    Ok(config)
}

/// Reads `<dir>/.env` without touching the process environment.
///
/// A missing file yields an empty map.
pub fn load_dotenv(dir: &Path) -> Result<HashMap<String, String>> {
    let path = dir.join(DOTENV_FILE_NAME);
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(&path)
        .with_context(|| format!("Error reading env file {path:?}"))?
    {
        let (key, value) = item.with_context(|| format!("Error parsing env file {path:?}"))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Picks the explicit `--config` path, else `watcher.yml` in the project dir.
///
/// An explicit path must exist; the implicit one is optional.
pub fn locate_config(explicit: Option<&Path>, project_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file {path:?} not found");
        }
        return Ok(Some(path.to_path_buf()));
    }

    let implicit = project_dir.join(CONFIG_FILE_NAME);
    Ok(implicit.exists().then_some(implicit))
}

/// Replaces `$NAME` values with the process environment (`$` alone reuses the key).
fn resolve_env(config: &mut FileConfig) -> Result<()> {
    let Some(env_map) = config.deploy.env.as_mut() else {
        return Ok(());
    };

    for (name, value) in env_map.iter_mut() {
        let Some(env_key) = value.strip_prefix('$') else {
            continue;
        };
        *value = extract_env_value(env_key, name)?;
    }
    Ok(())
}

fn extract_env_value(env_key: &str, default_env_name: &str) -> Result<String> {
    let key = if env_key.is_empty() {
        default_env_name
    } else {
        env_key
    };

    std::env::var(key).with_context(|| format!(r#""${key}" not found in environment"#))
}

fn check_commands(config: &FileConfig) -> Result<()> {
    let steps = [
        ("fetch", &config.deploy.fetch),
        ("reset", &config.deploy.reset),
        ("build", &config.deploy.build),
        ("restart", &config.deploy.restart),
    ];

    for (step, cmd) in steps {
        let Some(cmd) = cmd else { continue };
        let parts = shell_words::split(cmd)
            .with_context(|| format!("Invalid command line for step '{step}': {cmd}"))?;
        if parts.is_empty() {
            anyhow::bail!("Step '{step}' has an empty command");
        }
    }
    Ok(())
}
