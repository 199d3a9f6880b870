use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use fitpulse_core::Settings;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub google_fit_token: Option<String>,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "fitpulse").context("Could not determine home directory")?;
        Self::load_from(proj_dirs.data_dir(), |key| std::env::var(key).ok())
    }

    fn load_from<F>(data_dir: &Path, mut get: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let data_dir = data_dir.to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = get("FITPULSE_DB")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| data_dir.join("fitpulse.db"), PathBuf::from);
        let objects_dir = data_dir.join("objects");
        let google_fit_token = get("FITPULSE_GOOGLE_FIT_TOKEN").filter(|t| !t.trim().is_empty());
        let settings = Settings::from_env_with(&mut get).context("Invalid configuration")?;

        Ok(Config {
            db_path,
            data_dir,
            objects_dir,
            google_fit_token,
            settings,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        let (key, created) = load_or_create_secret(&self.data_dir.join("api_key"))?;
        if created {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        }
        Ok((key, created))
    }

    /// Secret used to sign object download URLs.
    pub fn load_or_create_signing_secret(&self) -> Result<String> {
        Ok(load_or_create_secret(&self.data_dir.join("object_signing_key"))?.0)
    }
}

fn load_or_create_secret(path: &Path) -> Result<(String, bool)> {
    use rand::Rng;
    use std::fmt::Write;

    if path.exists() {
        let key = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Ok((key, false));
        }
    }

    let bytes: [u8; 32] = rand::rng().random();
    let key = bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });
    std::fs::write(path, &key).with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok((key, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(dir: &Path, vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::load_from(dir, |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults_live_in_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(tmp.path(), &[]).unwrap();
        assert_eq!(config.db_path, tmp.path().join("fitpulse.db"));
        assert_eq!(config.objects_dir, tmp.path().join("objects"));
        assert!(config.google_fit_token.is_none());
        assert_eq!(config.settings.workout_goal_seconds, 1800);
    }

    #[test]
    fn test_env_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(
            tmp.path(),
            &[
                ("FITPULSE_DB", "/tmp/other.db"),
                ("FITPULSE_GOOGLE_FIT_TOKEN", "ya29.token"),
                ("FITPULSE_WORKOUT_GOAL_SECONDS", "2700"),
            ],
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.google_fit_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.settings.workout_goal_seconds, 2700);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(tmp.path(), &[("FITPULSE_DAY_OFFSET", "nowhere")]).is_err());
    }

    #[test]
    fn test_secret_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(tmp.path(), &[]).unwrap();
        let first = config.load_or_create_signing_secret().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(config.load_or_create_signing_secret().unwrap(), first);
    }
}
