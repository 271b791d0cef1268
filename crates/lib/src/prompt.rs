//! System instructions for the completion service.
//!
//! The built-in prompt ships with the crate (`config/PROMPT.md`); a prompt file from the
//! config replaces it when the file exists and is non-empty.

use std::fs;
use std::path::Path;

/// Built-in system instructions.
pub const DEFAULT_PROMPT: &str = include_str!("../config/PROMPT.md");

/// Load the system prompt: `prompt_file` when readable and non-empty, otherwise the default.
pub fn load_system_prompt(prompt_file: Option<&Path>) -> String {
    let Some(path) = prompt_file else {
        return DEFAULT_PROMPT.to_string();
    };
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => {
            log::info!("using system prompt from {}", path.display());
            s
        }
        Ok(_) => {
            log::warn!("prompt file {} is empty, using built-in prompt", path.display());
            DEFAULT_PROMPT.to_string()
        }
        Err(e) => {
            log::warn!("reading prompt file {}: {}; using built-in prompt", path.display(), e);
            DEFAULT_PROMPT.to_string()
        }
    }
}
