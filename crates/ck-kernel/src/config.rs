// config.rs — Kernel configuration.
//
// KernelConfig determines where the kernel keeps its durable state (token
// ledger, trust state, audit ledger) and which policy configuration it
// starts with. `for_state_dir()` produces the default layout; `load()` reads
// `kernel.toml` and fills omitted fields from that layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ck_policy::PolicyConfiguration;

use crate::error::KernelError;

/// Default name of the config file inside the state directory.
pub const CONFIG_FILE_NAME: &str = "kernel.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Directory holding all durable kernel state.
    pub state_dir: PathBuf,

    /// Consumed-token ledger (JSON).
    pub token_store: PathBuf,

    /// Trust epoch / key generation state (JSON).
    pub trust_state: PathBuf,

    /// Hash-chained audit ledger (JSONL).
    pub audit_log: PathBuf,

    /// Optional YAML `PolicyConfiguration`. Takes precedence over
    /// `policy_variant`.
    pub policy_file: Option<PathBuf>,

    /// Built-in policy variant: `standard` or `strict`.
    pub policy_variant: String,

    /// Glob patterns for recipient domains that do not count as external,
    /// e.g. `"*.example.com"`.
    pub internal_domains: Vec<String>,
}

/// On-disk form; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KernelConfigFile {
    state_dir: Option<PathBuf>,
    token_store: Option<PathBuf>,
    trust_state: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    policy_file: Option<PathBuf>,
    policy_variant: Option<String>,
    #[serde(default)]
    internal_domains: Vec<String>,
}

impl KernelConfig {
    /// Standard layout under `state_dir`.
    pub fn for_state_dir(state_dir: impl AsRef<Path>) -> Self {
        let dir = state_dir.as_ref().to_path_buf();
        Self {
            token_store: dir.join("tokens.json"),
            trust_state: dir.join("trust.json"),
            audit_log: dir.join("audit.jsonl"),
            policy_file: None,
            policy_variant: "standard".to_string(),
            internal_domains: Vec::new(),
            state_dir: dir,
        }
    }

    /// Read a TOML config. Relative paths are resolved against the config
    /// file's directory; omitted paths default to the standard layout.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| KernelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: KernelConfigFile =
            toml::from_str(&content).map_err(|source| KernelError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let state_dir = file.state_dir.map(resolve).unwrap_or_else(|| base.clone());
        let mut config = Self::for_state_dir(&state_dir);
        if let Some(p) = file.token_store {
            config.token_store = resolve(p);
        }
        if let Some(p) = file.trust_state {
            config.trust_state = resolve(p);
        }
        if let Some(p) = file.audit_log {
            config.audit_log = resolve(p);
        }
        config.policy_file = file.policy_file.map(resolve);
        if let Some(variant) = file.policy_variant {
            config.policy_variant = variant;
        }
        config.internal_domains = file.internal_domains;
        Ok(config)
    }

    /// Load `<state_dir>/kernel.toml` if present, else the default layout.
    pub fn discover(state_dir: impl AsRef<Path>) -> Result<Self, KernelError> {
        let candidate = state_dir.as_ref().join(CONFIG_FILE_NAME);
        if candidate.exists() {
            Self::load(candidate)
        } else {
            Ok(Self::for_state_dir(state_dir))
        }
    }

    /// The policy configuration the kernel starts with.
    pub fn policy(&self) -> Result<PolicyConfiguration, KernelError> {
        let config = match &self.policy_file {
            Some(path) => PolicyConfiguration::load(path)?,
            None => PolicyConfiguration::variant(&self.policy_variant).ok_or_else(|| {
                KernelError::InvalidConfig(format!(
                    "unknown policy variant '{}' (expected standard or strict)",
                    self.policy_variant
                ))
            })?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn for_state_dir_layout() {
        let config = KernelConfig::for_state_dir("/var/lib/ck");
        assert_eq!(config.token_store, PathBuf::from("/var/lib/ck/tokens.json"));
        assert_eq!(config.trust_state, PathBuf::from("/var/lib/ck/trust.json"));
        assert_eq!(config.audit_log, PathBuf::from("/var/lib/ck/audit.jsonl"));
        assert_eq!(config.policy_variant, "standard");
        assert!(config.internal_domains.is_empty());
    }

    #[test]
    fn load_fills_defaults_and_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
policy_variant = "strict"
audit_log = "logs/audit.jsonl"
internal_domains = ["example.com", "*.example.com"]
"#,
        )
        .unwrap();

        let config = KernelConfig::load(&path).unwrap();
        assert_eq!(config.state_dir, dir.path());
        assert_eq!(config.audit_log, dir.path().join("logs/audit.jsonl"));
        assert_eq!(config.token_store, dir.path().join("tokens.json"));
        assert_eq!(config.internal_domains.len(), 2);
        assert_eq!(config.policy().unwrap().name, "strict");
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "token_ledger = \"x\"\n").unwrap();
        assert!(matches!(
            KernelConfig::load(&path),
            Err(KernelError::ConfigParse { .. })
        ));
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let mut config = KernelConfig::for_state_dir("/tmp/ck");
        config.policy_variant = "lenient".into();
        assert!(matches!(config.policy(), Err(KernelError::InvalidConfig(_))));
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = KernelConfig::discover(dir.path()).unwrap();
        assert_eq!(config, KernelConfig::for_state_dir(dir.path()));
    }
}
