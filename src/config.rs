// Credentials and connection settings.
//
// Values come from a TOML credentials file and can be overridden per
// invocation from the command line or the environment. Everything is
// resolved and validated once, before the first request is sent.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// On-disk shape of the credentials file. Every field is optional here
/// because command-line overrides may fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialsFile {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    password_file: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

/// Per-invocation values that win over the credentials file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved settings needed to open a session.
#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// `<config_dir>/homebox-cli/credentials.toml`, if the platform has a
    /// config directory at all.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("homebox-cli").join("credentials.toml"))
    }

    /// Load settings from `path` (or the default location) and apply
    /// `overrides` on top.
    ///
    /// An explicitly named file must exist. The default file is optional:
    /// if it is absent, the overrides alone must supply every value.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::config(format!(
                        "credentials file not found: {}",
                        path.display()
                    )));
                }
                read_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => CredentialsFile::default(),
            },
        };
        Self::merge(file, overrides)
    }

    /// Parse credentials from a TOML string. `base_dir` anchors a relative
    /// `password_file`.
    pub fn from_toml_str(content: &str, base_dir: &Path, overrides: Overrides) -> Result<Self> {
        let file = parse(content, base_dir, "credentials")?;
        Self::merge(file, overrides)
    }

    fn merge(file: CredentialsFile, overrides: Overrides) -> Result<Self> {
        let base_url = overrides
            .base_url
            .or(file.base_url)
            .ok_or_else(|| missing("base_url"))?;
        let username = overrides
            .username
            .or(file.username)
            .ok_or_else(|| missing("username"))?;
        let password = overrides
            .password
            .or(file.password)
            .ok_or_else(|| missing("password"))?;

        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must start with http:// or https://, got '{base_url}'"
            )));
        }
        if username.trim().is_empty() {
            return Err(missing("username"));
        }

        Ok(Self {
            base_url,
            username,
            password,
            timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

fn missing(field: &str) -> Error {
    Error::config(format!(
        "no {field} given: set it in the credentials file or pass it on the command line"
    ))
}

fn read_file(path: &Path) -> Result<CredentialsFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&content, base_dir, &path.display().to_string())
}

/// `origin` names the source in error messages.
fn parse(content: &str, base_dir: &Path, origin: &str) -> Result<CredentialsFile> {
    let mut file: CredentialsFile = toml::from_str(content)
        .map_err(|e| Error::config(format!("malformed {origin}: {e}")))?;

    // An inline password wins over password_file.
    if file.password.is_none() {
        if let Some(rel) = file.password_file.take() {
            let path = if rel.is_absolute() { rel } else { base_dir.join(rel) };
            let secret = std::fs::read_to_string(&path).map_err(|e| {
                Error::config(format!("reading password file {}: {e}", path.display()))
            })?;
            file.password = Some(secret.trim_end_matches(['\r', '\n']).to_string());
        }
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_inline_credentials_and_trims_base_url() {
        let cfg = Config::from_toml_str(
            r#"
            base_url = "http://localhost:3100/api/v1/"
            username = "me@example.com"
            password = "secret"
            "#,
            Path::new("."),
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.base_url, "http://localhost:3100/api/v1");
        assert_eq!(cfg.username, "me@example.com");
        assert_eq!(cfg.password, "secret");
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }

    #[test]
    fn password_file_is_relative_to_the_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("homebox.key"), "hunter2\n").unwrap();
        let cfg_path = dir.path().join("credentials.toml");
        std::fs::write(
            &cfg_path,
            "base_url = \"https://hb.example\"\nusername = \"me\"\npassword_file = \"homebox.key\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let cfg = Config::load(Some(cfg_path.as_path()), Overrides::default()).unwrap();
        assert_eq!(cfg.password, "hunter2");
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_win_over_the_file() {
        let cfg = Config::from_toml_str(
            "base_url = \"http://a\"\nusername = \"file-user\"\npassword = \"file-pass\"\n",
            Path::new("."),
            Overrides {
                username: Some("cli-user".into()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(cfg.username, "cli-user");
        assert_eq!(cfg.password, "file-pass");
    }

    #[test]
    fn explicit_missing_file_fails_fast() {
        let missing = Path::new("/nonexistent/credentials.toml");
        let err = Config::load(Some(missing), Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_or_incomplete_files_are_config_errors() {
        let err = Config::from_toml_str("base_url = ", Path::new("."), Overrides::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_toml_str(
            "base_url = \"http://a\"\nusername = \"me\"\n",
            Path::new("."),
            Overrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("password"));

        let err = Config::from_toml_str(
            "base_url = \"ftp://a\"\nusername = \"me\"\npassword = \"x\"\n",
            Path::new("."),
            Overrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_output_masks_the_password() {
        let cfg = Config::from_toml_str(
            "base_url = \"http://a\"\nusername = \"me\"\npassword = \"topsecret\"\n",
            Path::new("."),
            Overrides::default(),
        )
        .unwrap();
        assert!(!format!("{cfg:?}").contains("topsecret"));
    }
}
