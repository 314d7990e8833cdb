use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use searchlens_core::auth::Token;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn tokens_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("searchlens");
    config_dir.join("tokens.json")
}

pub fn load_tokens(path: &PathBuf) -> HashMap<String, Token> {
    let Ok(data) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    serde_json::from_str(&data).unwrap_or_default()
}

/// Tokens are credentials: the file is created 0o600.
pub fn save_tokens(
    path: &PathBuf,
    tokens: &HashMap<String, Token>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(tokens)?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}
