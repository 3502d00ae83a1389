//! Runtime configuration, read from the environment.
//!
//! - `CHORES_URL` - API root of the chore server (default: `http://127.0.0.1:17020/api/v1`)
//! - `CHORES_DATA_DIR` - profile, database and proof objects (default: platform data dir)
//! - `CHORES_PUBLIC_URL` - base URL the server puts in proof retrieval URLs

use std::path::PathBuf;

use anyhow::Result;

pub const DEFAULT_PORT: u16 = 17020;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub public_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("CHORES_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{}/api/v1", DEFAULT_PORT));

        let data_dir = match std::env::var("CHORES_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        let public_url = std::env::var("CHORES_PUBLIC_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            api_url,
            data_dir,
            public_url,
        })
    }

    /// Device-local key-value file holding the profile.
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("device.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chores.db")
    }

    pub fn proofs_dir(&self) -> PathBuf {
        self.data_dir.join("proofs")
    }

    /// Base of proof retrieval URLs for a server listening on `port`.
    pub fn proof_base_url(&self, port: u16) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://127.0.0.1:{}/api/v1/proofs", port),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "chore-sync")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}
