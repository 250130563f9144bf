//! Bot configuration: a closed schema, a by-name field table for the
//! `config set` command, and JSON persistence.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::selection::SelectionAlgorithm;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CORPUS_FILE_NAME: &str = "corpus.txt";
const TOKEN_ENV_PREFIX: &str = "MIMICBOT_TOKEN_";
const COMMAND_PREFIX_STEM: &str = "mb";
/// Old name of `max_candidates` still found in existing config files.
const LEGACY_MAX_CANDIDATES: &str = "max_markov_chains";
/// Upper bound for every delay and wait, in seconds (30 days).
const MAX_SECONDS: f64 = 2_592_000.0;
/// Words per minute.
const MIN_TYPING_SPEED: f64 = 1.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not a valid parameter")]
    UnknownConfigField(String),

    #[error("Can't convert `{value}` into type: `{expected}`")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("`{0}` is not a valid selection algorithm")]
    InvalidSelectionAlgorithm(String),

    #[error("invalid configuration: {0}")]
    Invariant(String),

    #[error("missing environment variable {0}")]
    MissingEnv(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub max_sentence_length: usize,
    pub reply_probability: f64,
    #[serde(alias = "max_markov_chains")]
    pub max_candidates: usize,
    pub selection_algorithm: SelectionAlgorithm,
    pub avg_delay: f64,
    pub std_dev_delay: f64,
    pub min_delay: f64,
    pub avg_typing_speed: f64,
    pub std_dev_typing_speed: f64,
    pub min_typing_speed: f64,
    pub new_conversation_min_wait: f64,
    pub new_conversation_max_wait: f64,
    pub quiet_mode: bool,
    pub owner_id: u64,
    pub white_list_server_ids: Vec<u64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_sentence_length: 140,
            reply_probability: 0.1,
            max_candidates: 5,
            selection_algorithm: SelectionAlgorithm::CosineSimilarity,
            avg_delay: 5.0,
            std_dev_delay: 2.0,
            min_delay: 1.0,
            avg_typing_speed: 60.0,
            std_dev_typing_speed: 10.0,
            min_typing_speed: 30.0,
            new_conversation_min_wait: 3600.0,
            new_conversation_max_wait: 7200.0,
            quiet_mode: true,
            owner_id: 0,
            white_list_server_ids: vec![],
        }
    }
}

/// One configurable parameter, addressed by name.
pub struct FieldSpec {
    pub name: &'static str,
    pub type_name: &'static str,
    get: fn(&Configuration) -> String,
    set: fn(&mut Configuration, &str) -> Result<(), ConfigError>,
}

fn parse_value<T: FromStr>(
    field: &str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    })
}

fn parse_id_list(value: &str) -> Result<Vec<u64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|id| parse_value(WHITE_LIST_FIELD, id, "list[int]"))
        .collect()
}

const WHITE_LIST_FIELD: &str = "white_list_server_ids";

macro_rules! field {
    ($name:ident, $type_name:literal) => {
        FieldSpec {
            name: stringify!($name),
            type_name: $type_name,
            get: |c| c.$name.to_string(),
            set: |c, v| {
                c.$name = parse_value(stringify!($name), v, $type_name)?;
                Ok(())
            },
        }
    };
}

static FIELDS: &[FieldSpec] = &[
    field!(max_sentence_length, "int"),
    field!(reply_probability, "float"),
    field!(max_candidates, "int"),
    FieldSpec {
        name: "selection_algorithm",
        type_name: "str",
        get: |c| c.selection_algorithm.to_string(),
        set: |c, v| {
            c.selection_algorithm = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidSelectionAlgorithm(v.to_string()))?;
            Ok(())
        },
    },
    field!(avg_delay, "float"),
    field!(std_dev_delay, "float"),
    field!(min_delay, "float"),
    field!(avg_typing_speed, "float"),
    field!(std_dev_typing_speed, "float"),
    field!(min_typing_speed, "float"),
    field!(new_conversation_min_wait, "float"),
    field!(new_conversation_max_wait, "float"),
    field!(quiet_mode, "bool"),
    field!(owner_id, "int"),
    FieldSpec {
        name: WHITE_LIST_FIELD,
        type_name: "list[int]",
        get: |c| {
            c.white_list_server_ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        },
        set: |c, v| {
            c.white_list_server_ids = parse_id_list(v)?;
            Ok(())
        },
    },
];

impl Configuration {
    pub fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn field(name: &str) -> Result<&'static FieldSpec, ConfigError> {
        FIELDS
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ConfigError::UnknownConfigField(name.to_string()))
    }

    /// Sets a field from its string form and returns `(old, new)` values.
    ///
    /// The configuration is left unchanged if parsing or validation fails.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(String, String), ConfigError> {
        let spec = Self::field(name)?;
        let old = (spec.get)(self);

        let mut updated = self.clone();
        (spec.set)(&mut updated, value)?;
        updated.validate()?;

        *self = updated;
        Ok((old, (spec.get)(self)))
    }

    /// One `` `name: value` `` line per parameter.
    pub fn show(&self) -> String {
        FIELDS
            .iter()
            .map(|f| format!("`{}: {}`\n", f.name, (f.get)(self)))
            .collect()
    }

    pub fn is_server_allowed(&self, server_id: u64) -> bool {
        self.white_list_server_ids.contains(&server_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invariant(format!("{name} must be >= 0, got {value}")))
            }
        }
        fn seconds(name: &str, value: f64, allow_negative: bool) -> Result<(), ConfigError> {
            let in_range = value.is_finite()
                && value <= MAX_SECONDS
                && (allow_negative || value >= 0.0);
            if in_range {
                Ok(())
            } else {
                let lower = if allow_negative { "" } else { "non-negative " };
                Err(ConfigError::Invariant(format!(
                    "{name} must be a {lower}number of seconds up to {MAX_SECONDS}, got {value}"
                )))
            }
        }

        if !(0.0..=1.0).contains(&self.reply_probability) {
            return Err(ConfigError::Invariant(format!(
                "reply_probability must be within [0, 1], got {}",
                self.reply_probability
            )));
        }
        if self.max_candidates < 1 {
            return Err(ConfigError::Invariant("max_candidates must be >= 1".to_string()));
        }
        if self.max_sentence_length < 1 {
            return Err(ConfigError::Invariant(
                "max_sentence_length must be >= 1".to_string(),
            ));
        }
        seconds("avg_delay", self.avg_delay, true)?;
        seconds("std_dev_delay", self.std_dev_delay, false)?;
        seconds("min_delay", self.min_delay, false)?;
        seconds("new_conversation_min_wait", self.new_conversation_min_wait, false)?;
        seconds("new_conversation_max_wait", self.new_conversation_max_wait, false)?;
        non_negative("std_dev_typing_speed", self.std_dev_typing_speed)?;
        if !self.avg_typing_speed.is_finite() {
            return Err(ConfigError::Invariant(format!(
                "avg_typing_speed must be finite, got {}",
                self.avg_typing_speed
            )));
        }
        if !(self.min_typing_speed.is_finite() && self.min_typing_speed >= MIN_TYPING_SPEED) {
            return Err(ConfigError::Invariant(format!(
                "min_typing_speed must be at least {MIN_TYPING_SPEED} word per minute, got {}",
                self.min_typing_speed
            )));
        }
        if !(self.new_conversation_min_wait <= self.new_conversation_max_wait) {
            return Err(ConfigError::Invariant(format!(
                "new_conversation_min_wait ({}) must not exceed new_conversation_max_wait ({})",
                self.new_conversation_min_wait, self.new_conversation_max_wait
            )));
        }
        Ok(())
    }

    /// Parses a configuration, rejecting keys outside the schema.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = &value else {
            return Err(ConfigError::Invariant(
                "configuration must be a JSON object".to_string(),
            ));
        };

        for (key, field_value) in map {
            if key != LEGACY_MAX_CANDIDATES && !FIELDS.iter().any(|f| f.name == key) {
                return Err(ConfigError::UnknownConfigField(key.clone()));
            }
            if key == "selection_algorithm" {
                let name = field_value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| field_value.to_string());
                name.parse::<SelectionAlgorithm>()
                    .map_err(|_| ConfigError::InvalidSelectionAlgorithm(name.clone()))?;
            }
        }

        let config: Configuration = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }
}

/// Durable home of a bot's configuration.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Configuration, ConfigError>;
    fn save(&self, config: &Configuration) -> Result<(), ConfigError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Configuration, ConfigError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Configuration::from_json_str(&raw)
    }

    fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Outcome of a `config set`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
    /// False when the store rejected the write; the change is live in memory regardless.
    pub persisted: bool,
}

/// The live configuration of one bot plus the store that backs it.
pub struct SharedConfig {
    current: RwLock<Configuration>,
    store: Box<dyn ConfigStore>,
}

impl SharedConfig {
    pub fn new(config: Configuration, store: Box<dyn ConfigStore>) -> Self {
        Self {
            current: RwLock::new(config),
            store,
        }
    }

    pub fn snapshot(&self) -> Configuration {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_field(&self, name: &str, value: &str) -> Result<FieldChange, ConfigError> {
        let (old, new, updated) = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let (old, new) = current.set_field(name, value)?;
            (old, new, current.clone())
        };

        let persisted = match self.store.save(&updated) {
            Ok(()) => true,
            Err(e) => {
                warn!(field = name, error = %e, "configuration change applied but not persisted");
                false
            }
        };

        Ok(FieldChange {
            field: name.to_string(),
            old,
            new,
            persisted,
        })
    }
}

/// Process-level settings for one bot identity.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub index: u32,
    pub token: String,
    pub command_prefix: String,
    pub config_dir: PathBuf,
}

impl BotSettings {
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.config_dir.join(CORPUS_FILE_NAME)
    }
}

pub fn command_prefix(index: u32) -> String {
    format!("{COMMAND_PREFIX_STEM}{index}!")
}

/// Finds bots `1..` under `root`, stopping at the first missing directory.
pub fn discover_bots(root: &Path) -> Result<Vec<BotSettings>, ConfigError> {
    let mut bots = Vec::new();
    for index in 1.. {
        let config_dir = root.join(index.to_string());
        if !config_dir.is_dir() {
            break;
        }

        let token_var = format!("{TOKEN_ENV_PREFIX}{index}");
        let token = env::var(&token_var).map_err(|_| ConfigError::MissingEnv(token_var))?;

        bots.push(BotSettings {
            index,
            token,
            command_prefix: command_prefix(index),
            config_dir,
        });
    }
    Ok(bots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        serde_json::to_string(&Configuration::default()).unwrap()
    }

    #[test]
    fn default_configuration_is_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn loads_known_fields() {
        let config = Configuration::from_json_str(&sample_json()).unwrap();
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn legacy_candidate_key_is_accepted() {
        let raw = sample_json().replace("\"max_candidates\"", "\"max_markov_chains\"");
        let config = Configuration::from_json_str(&raw).unwrap();
        assert_eq!(config.max_candidates, 5);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut value: Value = serde_json::from_str(&sample_json()).unwrap();
        value["favourite_colour"] = Value::from("blue");
        let err = Configuration::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConfigField(ref k) if k == "favourite_colour"));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let raw = sample_json().replace("cosine_similarity", "coin_flip");
        let err = Configuration::from_json_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelectionAlgorithm(_)));
    }

    #[test]
    fn inverted_wait_window_is_rejected() {
        let mut value: Value = serde_json::from_str(&sample_json()).unwrap();
        value["new_conversation_min_wait"] = Value::from(100.0);
        value["new_conversation_max_wait"] = Value::from(10.0);
        let err = Configuration::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invariant(_)));
    }

    #[test]
    fn set_field_converts_and_reports_change() {
        let mut config = Configuration::default();
        let (old, new) = config.set_field("reply_probability", "0.5").unwrap();
        assert_eq!(old, "0.1");
        assert_eq!(new, "0.5");
        assert_eq!(config.reply_probability, 0.5);

        config.set_field("selection_algorithm", "match_words").unwrap();
        assert_eq!(config.selection_algorithm, SelectionAlgorithm::MatchWords);

        config.set_field("white_list_server_ids", "12, 34").unwrap();
        assert_eq!(config.white_list_server_ids, vec![12, 34]);
        assert!(config.show().contains("`white_list_server_ids: 12,34`"));
    }

    #[test]
    fn set_field_rejects_bad_input_without_changing_state() {
        let mut config = Configuration::default();

        let err = config.set_field("volume", "11").unwrap_err();
        assert_eq!(err.to_string(), "volume is not a valid parameter");

        let err = config.set_field("max_candidates", "lots").unwrap_err();
        assert_eq!(err.to_string(), "Can't convert `lots` into type: `int`");

        let err = config.set_field("quiet_mode", "maybe").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = config.set_field("reply_probability", "1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invariant(_)));

        let err = config.set_field("selection_algorithm", "vibes").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelectionAlgorithm(_)));

        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn non_finite_or_huge_timings_are_rejected() {
        let mut config = Configuration::default();
        let cases = [
            ("new_conversation_max_wait", "inf"),
            ("new_conversation_max_wait", "1e15"),
            ("new_conversation_min_wait", "NaN"),
            ("avg_delay", "inf"),
            ("avg_delay", "-inf"),
            ("min_delay", "1e15"),
            ("std_dev_delay", "inf"),
            ("avg_typing_speed", "inf"),
            ("min_typing_speed", "1e-300"),
        ];
        for (name, value) in cases {
            let err = config.set_field(name, value).unwrap_err();
            assert!(matches!(err, ConfigError::Invariant(_)), "{name} = {value}");
        }
        assert_eq!(config, Configuration::default());

        config.set_field("new_conversation_max_wait", "86400").unwrap();
        assert_eq!(config.new_conversation_max_wait, 86400.0);
    }

    #[test]
    fn show_lists_every_field() {
        let shown = Configuration::default().show();
        for field in Configuration::fields() {
            assert!(shown.contains(&format!("`{}: ", field.name)), "{}", field.name);
        }
        assert!(shown.contains("`selection_algorithm: cosine_similarity`"));
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join(CONFIG_FILE_NAME));

        let mut config = Configuration::default();
        config.quiet_mode = false;
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn json_store_save_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent").join(CONFIG_FILE_NAME));
        assert!(store.save(&Configuration::default()).is_err());
    }

    struct FailingStore;

    impl ConfigStore for FailingStore {
        fn load(&self) -> Result<Configuration, ConfigError> {
            Ok(Configuration::default())
        }

        fn save(&self, _config: &Configuration) -> Result<(), ConfigError> {
            Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn shared_config_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let shared = SharedConfig::new(Configuration::default(), Box::new(JsonFileStore::new(&path)));

        let change = shared.set_field("max_candidates", "8").unwrap();
        assert!(change.persisted);
        assert_eq!((change.old.as_str(), change.new.as_str()), ("5", "8"));
        assert_eq!(shared.snapshot().max_candidates, 8);
        assert_eq!(JsonFileStore::new(&path).load().unwrap().max_candidates, 8);
    }

    #[test]
    fn shared_config_keeps_unpersisted_change_in_memory() {
        let shared = SharedConfig::new(Configuration::default(), Box::new(FailingStore));

        let change = shared.set_field("quiet_mode", "false").unwrap();
        assert!(!change.persisted);
        assert!(!shared.snapshot().quiet_mode);
    }

    #[test]
    fn discovery_stops_at_first_gap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("1")).unwrap();
        std::fs::create_dir(dir.path().join("3")).unwrap();
        env::set_var("MIMICBOT_TOKEN_1", "token-one");

        let bots = discover_bots(dir.path()).unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].token, "token-one");
        assert_eq!(bots[0].command_prefix, "mb1!");
        assert_eq!(bots[0].config_path(), dir.path().join("1").join(CONFIG_FILE_NAME));
    }
}
