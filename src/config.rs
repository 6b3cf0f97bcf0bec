use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_FILE: &str = "kokoro-v1.0.onnx";
pub const DEFAULT_VOICES_FILE: &str = "voices-v1.0.bin";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("PORT must be a number, got '{0}'")]
    InvalidPort(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub model_path: PathBuf,
    pub voices_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port_str = lookup("PORT").unwrap_or_else(|| "8880".to_string());
        let port: u16 = port_str
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_str.clone()))?;

        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", host, port)))?;

        let base = install_dir();
        let model_path = lookup("KOKORO_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join(DEFAULT_MODEL_FILE));
        let voices_path = lookup("KOKORO_VOICES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join(DEFAULT_VOICES_FILE));

        Ok(Self {
            addr,
            model_path,
            voices_path,
        })
    }
}

/// Directory holding the running executable, so default artifact paths do
/// not depend on the working directory.
fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
