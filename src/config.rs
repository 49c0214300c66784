//! # Configuration Management
//!
//! The single source of truth for which decoys run, on which ports and with
//! which behavioral parameters.
//!
//! Settings are flat dotted keys (`mysql.port`, `device.name`) mapped to JSON
//! scalars. The snapshot is loaded once from the first readable file in an
//! ordered search list and only ever mutated through [`Config::apply_update`],
//! which validates each key independently and merges the valid subset.
//!
//! ## Update rules
//! - `device.node_id` and `device.mac` are immutable and silently dropped
//! - static network keys are dropped while `device.dhcp.enabled` is true
//! - keys of a disabled module (other than its `enabled` flag) are dropped
//! - every remaining key is validated on its own; failures are collected
//! - no two enabled modules may end up on the same port
//!
//! ## Persistence
//! [`Config::save`] renames the previous file to `<path>.bak` and writes the
//! whole snapshot as sorted, 4-space indented JSON.

use crate::error::{constants, HoneypotError, Result, ValidationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// File name searched for in each configuration directory
pub const CONFIG_FILE_NAME: &str = "honeypot.conf";

/// Deployment-standard configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/honeypotd";

/// Suffix appended to the previous file on save
pub const BACKUP_SUFFIX: &str = ".bak";

/// Sample configuration shipped with the binary
pub const SAMPLE_SETTINGS: &str = include_str!("../data/settings.json");

/// Keys that can never be changed once set
pub const IMMUTABLE_KEYS: [&str; 2] = ["device.node_id", "device.mac"];

/// Key selecting DHCP over the static network settings
pub const DHCP_KEY: &str = "device.dhcp.enabled";

/// Static network keys, inert while DHCP is enabled
pub const STATIC_NETWORK_KEYS: [&str; 5] = [
    "device.ip_address",
    "device.netmask",
    "device.gw",
    "device.dns1",
    "device.dns2",
];

/// Maximum length of the free-text device fields
pub const MAX_TEXT_LEN: usize = 100;

/// Accepted range for per-module idle timeouts, in seconds
pub const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=300;

const TEXT_PUNCTUATION: &str = "+-#_";

/// Length limit on a module's version or banner string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannerRule {
    /// Attribute name under the module (`version` for `ssh.version`)
    pub attribute: &'static str,
    /// Maximum number of characters
    pub max_len: usize,
    /// Human readable label used in error messages
    pub label: &'static str,
}

/// Static description of one decoy module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub default_port: u16,
    pub banner: Option<BannerRule>,
}

impl ModuleDescriptor {
    /// Key of this module's enable flag
    pub fn enabled_key(&self) -> String {
        format!("{}.enabled", self.name)
    }

    /// Key of this module's listen port
    pub fn port_key(&self) -> String {
        format!("{}.port", self.name)
    }
}

/// The closed set of decoy modules the cascade rules apply to
pub const MODULES: &[ModuleDescriptor] = &[
    ModuleDescriptor {
        name: "ftp",
        default_port: 21,
        banner: None,
    },
    ModuleDescriptor {
        name: "ssh",
        default_port: 22,
        // RFC 4253: 255 chars including the trailing CR LF
        banner: Some(BannerRule {
            attribute: "version",
            max_len: 253,
            label: "SSH version string",
        }),
    },
    ModuleDescriptor {
        name: "http",
        default_port: 80,
        banner: None,
    },
    ModuleDescriptor {
        name: "mysql",
        default_port: 3306,
        banner: None,
    },
];

/// Look up a module descriptor by name
pub fn descriptor(name: &str) -> Option<&'static ModuleDescriptor> {
    MODULES.iter().find(|m| m.name == name)
}

/// Ordered list of candidate configuration files
pub fn default_search_paths() -> Vec<PathBuf> {
    vec![
        Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME),
        PathBuf::from(CONFIG_FILE_NAME),
    ]
}

/// Path the previous file is moved to on save
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Write the shipped sample configuration, refusing to overwrite an existing file
pub fn write_sample<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Err(HoneypotError::Persistence(format!(
            "{} already exists",
            path.display()
        )));
    }
    fs::write(path, SAMPLE_SETTINGS)
        .map_err(|e| HoneypotError::Persistence(format!("Failed to write {}: {e}", path.display())))
}

/// Module part of a dotted key (`mysql` for `mysql.port`)
fn module_of(key: &str) -> Option<&str> {
    key.split_once('.').map(|(module, _)| module)
}

/// Loose truthiness used for enable flags
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Full in-memory settings snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    settings: BTreeMap<String, Value>,
    path: Option<PathBuf>,
}

impl Config {
    /// Load the first candidate file that opens and parses
    ///
    /// Read and parse failures fall through to the next candidate. Running out
    /// of candidates is fatal for the caller.
    #[instrument(skip(paths))]
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        for path in paths {
            let path = path.as_ref();
            match Self::from_file(path) {
                Ok(config) => {
                    info!(path = %path.display(), "Using config file");
                    return Ok(config);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load config file");
                }
            }
        }

        Err(HoneypotError::ConfigNotFound {
            tried: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
        })
    }

    /// Load a single JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json(&contents)?.with_path(path.as_ref()))
    }

    /// Parse a JSON object of settings
    pub fn from_json(content: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// Build a snapshot from a JSON object value
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                settings: map.into_iter().collect(),
                path: None,
            }),
            _ => Err(HoneypotError::Custom(constants::ERR_NOT_AN_OBJECT.to_string())),
        }
    }

    /// Attach the file this snapshot is saved to
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored value for `key`, falling back to `default`
    pub fn get(&self, key: &str, default: Option<Value>) -> Result<Value> {
        match self.settings.get(key) {
            Some(value) => Ok(value.clone()),
            None => default.ok_or_else(|| HoneypotError::MissingKey(key.to_string())),
        }
    }

    /// Typed lookup; a stored value of the wrong shape is a validation error
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.settings.get(key) {
            None => Ok(default),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                HoneypotError::Validation(ValidationError::new(
                    key,
                    format!("Unexpected value ({value}): {e}"),
                ))
            }),
        }
    }

    /// `false` if `<name>.enabled` is absent or falsy
    pub fn module_enabled(&self, name: &str) -> bool {
        self.settings
            .get(&format!("{}.enabled", name.to_lowercase()))
            .is_some_and(is_truthy)
    }

    /// Node identifier stamped on every emitted event
    pub fn node_id(&self) -> Option<String> {
        self.settings
            .get("device.node_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Validate and merge a batch of candidate settings
    ///
    /// Returns one [`ValidationError`] per rejected key. An empty list means the
    /// whole batch was merged; otherwise every key without an error still was.
    pub fn apply_update(&mut self, mut candidate: BTreeMap<String, Value>) -> Vec<ValidationError> {
        for key in IMMUTABLE_KEYS {
            if candidate.remove(key).is_some() {
                debug!(key, "Ignoring update to immutable key");
            }
        }

        let dhcp = candidate
            .get(DHCP_KEY)
            .or_else(|| self.settings.get(DHCP_KEY))
            .is_some_and(is_truthy);
        if dhcp {
            for key in STATIC_NETWORK_KEYS {
                if candidate.remove(key).is_some() {
                    debug!(key, "Ignoring static network key while DHCP is enabled");
                }
            }
        }

        let disabled: BTreeSet<&'static str> = MODULES
            .iter()
            .filter(|m| !self.enabled_after(m.name, &candidate).unwrap_or(false))
            .map(|m| m.name)
            .collect();
        candidate.retain(|key, _| match module_of(key) {
            Some(module) if disabled.contains(module) => key.ends_with(".enabled"),
            _ => true,
        });

        let mut errors: Vec<ValidationError> = candidate
            .iter()
            .filter_map(|(key, value)| validate_key(key, value).err())
            .collect();

        let rejected: BTreeSet<String> = errors.iter().map(|e| e.key.clone()).collect();
        errors.extend(self.port_conflicts(&candidate, &rejected));

        candidate.retain(|key, _| !errors.iter().any(|e| &e.key == key));
        if !candidate.is_empty() {
            debug!(
                applied = candidate.len(),
                rejected = errors.len(),
                "Merging settings update"
            );
        }
        self.settings.extend(candidate);

        errors
    }

    /// Set one key, returning the error reported for it
    pub fn set_val(&mut self, key: &str, value: Value) -> std::result::Result<(), ValidationError> {
        let mut candidate = BTreeMap::new();
        candidate.insert(key.to_string(), value);
        match self.apply_update(candidate).into_iter().find(|e| e.key == key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Back up the previous file and write the full snapshot
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| HoneypotError::Persistence(constants::ERR_NO_BACKING_FILE.into()))?;
        let body = self.to_json()?;

        if path.is_file() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to back up config file");
                HoneypotError::Persistence(format!("Failed to back up {}: {e}", path.display()))
            })?;
        }

        fs::write(path, body).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to save config file");
            HoneypotError::Persistence(format!("Failed to write {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), "Saved config file");
        Ok(())
    }

    /// All settings, sorted by key
    pub fn to_map(&self) -> &BTreeMap<String, Value> {
        &self.settings
    }

    /// Sorted, 4-space indented JSON
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.settings.serialize(&mut serializer)?;
        String::from_utf8(buf).map_err(|e| HoneypotError::Custom(e.to_string()))
    }

    /// Settings as a JSON object value
    pub fn to_value(&self) -> Value {
        Value::Object(self.settings.clone().into_iter().collect::<Map<_, _>>())
    }

    /// Enable state of `module` once `candidate` is merged, if either side names it
    fn enabled_after(&self, module: &str, candidate: &BTreeMap<String, Value>) -> Option<bool> {
        let key = format!("{module}.enabled");
        candidate
            .get(&key)
            .or_else(|| self.settings.get(&key))
            .map(is_truthy)
    }

    /// Port collisions among enabled modules after merging `candidate`
    fn port_conflicts(
        &self,
        candidate: &BTreeMap<String, Value>,
        rejected: &BTreeSet<String>,
    ) -> Vec<ValidationError> {
        let mut ports: BTreeMap<&str, &Value> = self
            .settings
            .iter()
            .filter(|(key, _)| key.ends_with(".port"))
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        ports.extend(
            candidate
                .iter()
                .filter(|(key, _)| key.ends_with(".port") && !rejected.contains(*key))
                .map(|(key, value)| (key.as_str(), value)),
        );

        let mut by_port: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
        for (key, value) in ports {
            // Same rule as the disabled-module cascade: no flag means disabled
            let active = match module_of(key).and_then(descriptor) {
                Some(module) => self.enabled_after(module.name, candidate).unwrap_or(false),
                None => true,
            };
            if let (true, Some(port)) = (active, value.as_u64()) {
                by_port.entry(port).or_default().push(key);
            }
        }

        let mut errors = Vec::new();
        for (port, keys) in by_port.into_iter().filter(|(_, keys)| keys.len() > 1) {
            let services = keys
                .iter()
                .filter_map(|key| module_of(key))
                .collect::<Vec<_>>()
                .join(", ");
            let message = format!("{} ({services})", constants::ERR_PORT_CONFLICT);
            warn!(port, services = %services, "Port conflict in settings update");
            errors.extend(keys.into_iter().map(|key| ValidationError::new(key, &message)));
        }
        errors
    }
}

/// Validate one setting in isolation
pub fn validate_key(key: &str, value: &Value) -> std::result::Result<(), ValidationError> {
    if key.ends_with(".enabled") && !value.is_boolean() {
        return Err(ValidationError::new(
            key,
            format!("{} ({value})", constants::ERR_NOT_BOOLEAN),
        ));
    }

    if key.ends_with(".port") {
        match value.as_u64() {
            Some(port) if (1..=u64::from(u16::MAX)).contains(&port) => {}
            _ => {
                return Err(ValidationError::new(
                    key,
                    format!("{} ({value})", constants::ERR_INVALID_PORT),
                ))
            }
        }
    }

    if key.ends_with(".timeout") {
        match value.as_u64() {
            Some(secs) if TIMEOUT_RANGE_SECS.contains(&secs) => {}
            _ => {
                return Err(ValidationError::new(
                    key,
                    format!("{} ({value})", constants::ERR_INVALID_TIMEOUT),
                ))
            }
        }
    }

    if let Some((module, attribute)) = key.split_once('.') {
        let rule = descriptor(module)
            .and_then(|m| m.banner)
            .filter(|rule| rule.attribute == attribute);
        if let Some(rule) = rule {
            let text = value
                .as_str()
                .ok_or_else(|| ValidationError::new(key, constants::ERR_NOT_A_STRING))?;
            if text.chars().count() > rule.max_len {
                let head: String = text.chars().take(5).collect();
                return Err(ValidationError::new(
                    key,
                    format!("{} too long ({head}..)", rule.label),
                ));
            }
        }
    }

    match key {
        "device.name" => validate_text(key, value, false),
        "device.desc" => validate_text(key, value, true),
        _ => Ok(()),
    }
}

fn validate_text(key: &str, value: &Value, allow_space: bool) -> std::result::Result<(), ValidationError> {
    let text = value
        .as_str()
        .ok_or_else(|| ValidationError::new(key, constants::ERR_NOT_A_STRING))?;
    let len = text.chars().count();

    if len > MAX_TEXT_LEN {
        return Err(ValidationError::new(key, constants::ERR_NAME_TOO_LONG));
    }
    if len < 1 {
        return Err(ValidationError::new(key, constants::ERR_NAME_TOO_SHORT));
    }

    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || TEXT_PUNCTUATION.contains(c) || (allow_space && c == ' ')
    };
    if !text.chars().all(allowed) {
        let message = if allow_space {
            constants::ERR_DESC_CHARSET
        } else {
            constants::ERR_NAME_CHARSET
        };
        return Err(ValidationError::new(key, message));
    }

    Ok(())
}

/// Outcome of a management-channel update
#[derive(Debug)]
pub struct Submission {
    /// One entry per rejected key; every other key was merged
    pub errors: Vec<ValidationError>,
    /// Set when the merged snapshot could not be written
    pub persistence: Option<HoneypotError>,
}

impl Submission {
    /// Every key merged and the result persisted
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.persistence.is_none()
    }
}

/// Shared, lock-guarded handle to the process-wide snapshot
///
/// Every component that needs settings receives a clone of this handle at
/// construction. Updates and saves take the write lock for their whole
/// duration so a save always persists a consistent snapshot.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Config>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Run `f` against the current snapshot
    pub fn read<R>(&self, f: impl FnOnce(&Config) -> R) -> Result<R> {
        let guard = self.inner.read().map_err(|_| HoneypotError::LockPoisoned)?;
        Ok(f(&guard))
    }

    /// Clone of the current snapshot
    pub fn snapshot(&self) -> Result<Config> {
        self.read(Config::clone)
    }

    pub fn apply_update(&self, candidate: BTreeMap<String, Value>) -> Result<Vec<ValidationError>> {
        let mut guard = self.inner.write().map_err(|_| HoneypotError::LockPoisoned)?;
        Ok(guard.apply_update(candidate))
    }

    pub fn set_val(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| HoneypotError::LockPoisoned)?;
        guard.set_val(key, value)?;
        Ok(())
    }

    /// Persist the snapshot under the write lock
    pub fn save(&self) -> Result<()> {
        let guard = self.inner.write().map_err(|_| HoneypotError::LockPoisoned)?;
        guard.save()
    }

    /// Management-channel update: merge the valid subset, then persist it if anything changed
    ///
    /// A persistence failure leaves the merged snapshot authoritative in memory
    /// and is reported in [`Submission::persistence`] next to the rejected keys.
    #[instrument(skip(self, candidate), fields(keys = candidate.len()))]
    pub fn submit(&self, candidate: BTreeMap<String, Value>) -> Result<Submission> {
        let mut guard = self.inner.write().map_err(|_| HoneypotError::LockPoisoned)?;
        let before = guard.settings.clone();
        let errors = guard.apply_update(candidate);
        for err in &errors {
            info!(key = %err.key, message = %err.message, "Rejected setting");
        }

        let persistence = if guard.settings != before {
            guard.save().err()
        } else {
            None
        };
        Ok(Submission {
            errors,
            persistence,
        })
    }

    /// Management-channel read of the full snapshot
    pub fn to_json(&self) -> Result<String> {
        self.read(Config::to_json)?
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    fn base() -> Config {
        Config::from_value(json!({
            "device.node_id": "node-a",
            "device.mac": "00:11:22:33:44:55",
            "device.name": "decoy",
            "device.dhcp.enabled": false,
            "device.ip_address": "10.0.0.2",
            "ftp.enabled": true,
            "ftp.port": 21,
            "ssh.enabled": false,
            "ssh.port": 22,
            "mysql.enabled": true,
            "mysql.port": 3306,
        }))
        .unwrap()
    }

    fn update(pairs: Value) -> BTreeMap<String, Value> {
        match pairs {
            Value::Object(map) => map.into_iter().collect(),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn truthiness_matches_loose_flags() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn module_enabled_defaults_to_false() {
        let config = base();
        assert!(config.module_enabled("mysql"));
        assert!(config.module_enabled("MySQL"));
        assert!(!config.module_enabled("ssh"));
        assert!(!config.module_enabled("telnet"));
    }

    #[test]
    fn get_falls_back_to_default_only_when_missing() {
        let config = base();
        assert_eq!(config.get("mysql.port", Some(json!(1))).unwrap(), json!(3306));
        assert_eq!(config.get("http.port", Some(json!(80))).unwrap(), json!(80));
        assert!(matches!(
            config.get("http.port", None),
            Err(HoneypotError::MissingKey(key)) if key == "http.port"
        ));
    }

    #[test]
    fn get_as_rejects_wrong_shape() {
        let config = base();
        assert_eq!(config.get_as::<u16>("mysql.port", 1).unwrap(), 3306);
        assert_eq!(config.get_as::<u16>("http.port", 80).unwrap(), 80);
        assert!(config.get_as::<u16>("device.name", 1).is_err());
    }

    #[test]
    fn immutable_keys_are_silently_dropped() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "device.node_id": "evil",
            "device.mac": "ff:ff:ff:ff:ff:ff",
        })));
        assert!(errors.is_empty());
        assert_eq!(config.get("device.node_id", None).unwrap(), json!("node-a"));
        assert_eq!(config.get("device.mac", None).unwrap(), json!("00:11:22:33:44:55"));
    }

    #[test]
    fn static_network_keys_ignored_when_dhcp_in_candidate() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "device.dhcp.enabled": true,
            "device.ip_address": "192.168.1.9",
            "device.gw": "192.168.1.1",
        })));
        assert!(errors.is_empty());
        assert_eq!(config.get("device.dhcp.enabled", None).unwrap(), json!(true));
        assert_eq!(config.get("device.ip_address", None).unwrap(), json!("10.0.0.2"));
        assert!(config.get("device.gw", None).is_err());
    }

    #[test]
    fn static_network_keys_ignored_when_dhcp_already_on() {
        let mut config = base();
        config.set_val("device.dhcp.enabled", json!(true)).unwrap();
        config.set_val("device.netmask", json!("255.0.0.0")).unwrap();
        assert!(config.get("device.netmask", None).is_err());
    }

    #[test]
    fn static_network_keys_applied_without_dhcp() {
        let mut config = base();
        config.set_val("device.ip_address", json!("10.0.0.9")).unwrap();
        assert_eq!(config.get("device.ip_address", None).unwrap(), json!("10.0.0.9"));
    }

    #[test]
    fn disabled_module_settings_are_inert() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "ssh.port": 99999,
            "ssh.version": "SSH-2.0-x",
        })));
        assert!(errors.is_empty(), "inert keys must not error: {errors:?}");
        assert_eq!(config.get("ssh.port", None).unwrap(), json!(22));
        assert!(config.get("ssh.version", None).is_err());
    }

    #[test]
    fn enabling_a_module_in_the_same_batch_applies_its_settings() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "ssh.enabled": true,
            "ssh.port": 2222,
        })));
        assert!(errors.is_empty());
        assert!(config.module_enabled("ssh"));
        assert_eq!(config.get("ssh.port", None).unwrap(), json!(2222));
    }

    #[test]
    fn disabling_a_module_drops_its_other_keys() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "ftp.enabled": false,
            "ftp.port": 2121,
        })));
        assert!(errors.is_empty());
        assert!(!config.module_enabled("ftp"));
        assert_eq!(config.get("ftp.port", None).unwrap(), json!(21));
    }

    #[test]
    fn invalid_keys_do_not_block_valid_ones() {
        let mut config = base();
        let errors = config.apply_update(update(json!({
            "mysql.port": 0,
            "ftp.enabled": "yes",
            "device.name": "new-name",
        })));
        let keys: BTreeSet<_> = errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, BTreeSet::from(["ftp.enabled", "mysql.port"]));
        assert_eq!(config.get("device.name", None).unwrap(), json!("new-name"));
        assert_eq!(config.get("mysql.port", None).unwrap(), json!(3306));
        assert_eq!(config.get("ftp.enabled", None).unwrap(), json!(true));
    }

    #[test]
    fn port_collision_reports_each_colliding_key() {
        let mut config = base();
        let errors = config.apply_update(update(json!({ "mysql.port": 21 })));
        assert_eq!(errors.len(), 2);
        for err in &errors {
            assert_eq!(err.message, "More than one service uses this port (ftp, mysql)");
        }
        let keys: BTreeSet<_> = errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, BTreeSet::from(["ftp.port", "mysql.port"]));
        assert_eq!(config.get("mysql.port", None).unwrap(), json!(3306));
    }

    #[test]
    fn module_without_enabled_flag_does_not_collide() {
        let mut config = Config::from_value(json!({
            "ftp.enabled": true,
            "ftp.port": 21,
            "mysql.port": 3306,
        }))
        .unwrap();
        let errors = config.apply_update(update(json!({ "ftp.port": 3306 })));
        assert!(errors.is_empty(), "mysql has no enabled flag: {errors:?}");
        assert_eq!(config.get("ftp.port", None).unwrap(), json!(3306));
    }

    #[test]
    fn disabled_module_port_does_not_collide() {
        let mut config = base();
        let errors = config.apply_update(update(json!({ "mysql.port": 22 })));
        assert!(errors.is_empty(), "ssh is disabled: {errors:?}");
        assert_eq!(config.get("mysql.port", None).unwrap(), json!(22));
    }

    #[test]
    fn timeout_must_be_in_range() {
        assert!(validate_key("mysql.timeout", &json!(10)).is_ok());
        assert!(validate_key("mysql.timeout", &json!(0)).is_err());
        assert!(validate_key("mysql.timeout", &json!(301)).is_err());
        assert!(validate_key("mysql.timeout", &json!("10")).is_err());
    }

    #[test]
    fn ssh_version_length_limit() {
        let ok = "S".repeat(253);
        let long = "SSH-2.0-".to_string() + &"x".repeat(250);
        assert!(validate_key("ssh.version", &json!(ok)).is_ok());
        let err = validate_key("ssh.version", &json!(long)).unwrap_err();
        assert_eq!(err.message, "SSH version string too long (SSH-2..)");
    }

    #[test]
    fn desc_allows_spaces_but_name_does_not() {
        assert!(validate_key("device.desc", &json!("Front office printer")).is_ok());
        let err = validate_key("device.name", &json!("Front office")).unwrap_err();
        assert_eq!(err.message, constants::ERR_NAME_CHARSET);
        let err = validate_key("device.desc", &json!("rm -rf /")).unwrap_err();
        assert_eq!(err.message, constants::ERR_DESC_CHARSET);
        let err = validate_key("device.name", &json!("")).unwrap_err();
        assert_eq!(err.message, constants::ERR_NAME_TOO_SHORT);
    }

    #[test]
    fn save_without_path_is_a_persistence_error() {
        assert!(matches!(base().save(), Err(HoneypotError::Persistence(_))));
    }

    #[test]
    fn json_is_sorted_and_indented() {
        let config = Config::from_value(json!({ "b.x": 1, "a.y": true })).unwrap();
        assert_eq!(config.to_json().unwrap(), "{\n    \"a.y\": true,\n    \"b.x\": 1\n}");
    }

    #[test]
    fn sample_settings_parse_and_validate() {
        let config = Config::from_json(SAMPLE_SETTINGS).unwrap();
        assert!(config.module_enabled("mysql"));
        for (key, value) in config.to_map() {
            assert!(validate_key(key, value).is_ok(), "{key} failed validation");
        }
    }

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/etc/honeypotd/honeypot.conf")),
            PathBuf::from("/etc/honeypotd/honeypot.conf.bak")
        );
    }
}
