//! Initialize the configuration directory: default `config.json` and an editable `PROMPT.md`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::prompt::DEFAULT_PROMPT;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `PROMPT.md` with the built-in system prompt if missing.
/// - Writes `config.json` with every section present and `agent.promptFile` pointing at `PROMPT.md` if missing.
///
/// Existing files are left untouched. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let prompt_path = config_dir.join("PROMPT.md");
    if !prompt_path.exists() {
        std::fs::write(&prompt_path, DEFAULT_PROMPT)
            .with_context(|| format!("writing default prompt to {}", prompt_path.display()))?;
        log::info!("wrote default prompt to {}", prompt_path.display());
    }

    if !config_path.exists() {
        let mut config = Config::default();
        config.agent.prompt_file = Some(prompt_path);
        let json = serde_json::to_string_pretty(&config).context("serializing default config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn init_writes_loadable_config_and_prompt() {
        let dir = std::env::temp_dir().join(format!("relay-init-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        let out = init_config_dir(&config_path).unwrap();
        assert_eq!(out, dir);
        assert_eq!(
            std::fs::read_to_string(dir.join("PROMPT.md")).unwrap(),
            DEFAULT_PROMPT
        );

        let (config, _) = load_config(Some(config_path.clone())).unwrap();
        assert_eq!(config.agent.prompt_file, Some(dir.join("PROMPT.md")));

        std::fs::write(&config_path, "{}").unwrap();
        init_config_dir(&config_path).unwrap();
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "{}");
        let _ = std::fs::remove_dir_all(dir);
    }
}
