use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::attachment::AttachmentLimits;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub app_name: String,
    /// Messenger host the bot account lives on. Stamped onto senders that
    /// arrive without one and printed in the ticket mail.
    pub host: String,
    pub bot_id: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitsConfig {
    pub max_attachments_count: usize,
    pub max_attachment_size: u64,
    pub max_attachments_size: u64,
    pub max_description_length: usize,
}

impl LimitsConfig {
    pub fn attachment_limits(&self) -> AttachmentLimits {
        AttachmentLimits {
            max_count: self.max_attachments_count,
            max_file_size: self.max_attachment_size,
            max_total_size: self.max_attachments_size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub attachments_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub relay_token: Option<SecretString>,
    pub sender_email: String,
    pub recipient_email: String,
    pub email_title: String,
    pub show_sender_name_in_email_title: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_host: Option<String>,
    pub attachments_dir: Option<PathBuf>,
    pub mail_relay_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid byte size `{0}` (expected bytes or a value like `9.9MiB`)")]
    InvalidByteSize(String),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

// 9.9 MiB and 20 MiB.
const DEFAULT_MAX_ATTACHMENT_SIZE: u64 = 10_380_902;
const DEFAULT_MAX_ATTACHMENTS_SIZE: u64 = 20 * 1024 * 1024;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                app_name: "eXpress".to_string(),
                host: String::new(),
                bot_id: "deskbot".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://deskbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            limits: LimitsConfig {
                max_attachments_count: 20,
                max_attachment_size: DEFAULT_MAX_ATTACHMENT_SIZE,
                max_attachments_size: DEFAULT_MAX_ATTACHMENTS_SIZE,
                max_description_length: 3500,
            },
            storage: StorageConfig { attachments_dir: PathBuf::from("./attachments") },
            mail: MailConfig {
                relay_url: None,
                relay_token: None,
                sender_email: String::new(),
                recipient_email: String::new(),
                email_title: "Support request".to_string(),
                show_sender_name_in_email_title: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Parses `1024`, `512B`, `9.9MiB`, `20 MB` and similar into bytes. Binary
/// units are powers of 1024, decimal units powers of 1000; fractions round down.
pub fn parse_byte_size(raw: &str) -> Result<u64, ConfigError> {
    let value = raw.trim();
    let split_at = value
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split_at);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1_000,
        "kib" => 1 << 10,
        "mb" => 1_000_000,
        "mib" => 1 << 20,
        "gb" => 1_000_000_000,
        "gib" => 1 << 30,
        _ => return Err(ConfigError::InvalidByteSize(raw.to_string())),
    };

    let number: f64 = number.parse().map_err(|_| ConfigError::InvalidByteSize(raw.to_string()))?;
    if !number.is_finite() || number < 0.0 {
        return Err(ConfigError::InvalidByteSize(raw.to_string()));
    }

    Ok((number * multiplier as f64).floor() as u64)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deskbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(bot) = patch.bot {
            if let Some(app_name) = bot.app_name {
                self.bot.app_name = app_name;
            }
            if let Some(host) = bot.host {
                self.bot.host = host;
            }
            if let Some(bot_id) = bot.bot_id {
                self.bot.bot_id = bot_id;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(limits) = patch.limits {
            if let Some(count) = limits.max_attachments_count {
                self.limits.max_attachments_count = count;
            }
            if let Some(size) = limits.max_attachment_size {
                self.limits.max_attachment_size = size.into_bytes()?;
            }
            if let Some(size) = limits.max_attachments_size {
                self.limits.max_attachments_size = size.into_bytes()?;
            }
            if let Some(length) = limits.max_description_length {
                self.limits.max_description_length = length;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(attachments_dir) = storage.attachments_dir {
                self.storage.attachments_dir = attachments_dir;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(relay_url) = mail.relay_url {
                self.mail.relay_url = Some(relay_url);
            }
            if let Some(relay_token) = mail.relay_token {
                self.mail.relay_token = Some(secret_value(relay_token));
            }
            if let Some(sender_email) = mail.sender_email {
                self.mail.sender_email = sender_email;
            }
            if let Some(recipient_email) = mail.recipient_email {
                self.mail.recipient_email = recipient_email;
            }
            if let Some(email_title) = mail.email_title {
                self.mail.email_title = email_title;
            }
            if let Some(show) = mail.show_sender_name_in_email_title {
                self.mail.show_sender_name_in_email_title = show;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DESKBOT_BOT_APP_NAME") {
            self.bot.app_name = value;
        }
        if let Some(value) = read_env("DESKBOT_BOT_HOST") {
            self.bot.host = value;
        }
        if let Some(value) = read_env("DESKBOT_BOT_ID") {
            self.bot.bot_id = value;
        }

        if let Some(value) = read_env("DESKBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DESKBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DESKBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DESKBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_MAX_ATTACHMENTS_COUNT") {
            self.limits.max_attachments_count =
                parse_usize("DESKBOT_MAX_ATTACHMENTS_COUNT", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_MAX_ATTACHMENT_SIZE") {
            self.limits.max_attachment_size = parse_byte_size(&value)?;
        }
        if let Some(value) = read_env("DESKBOT_MAX_ATTACHMENTS_SIZE") {
            self.limits.max_attachments_size = parse_byte_size(&value)?;
        }
        if let Some(value) = read_env("DESKBOT_MAX_DESCRIPTION_LENGTH") {
            self.limits.max_description_length =
                parse_usize("DESKBOT_MAX_DESCRIPTION_LENGTH", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_ATTACHMENTS_DIR") {
            self.storage.attachments_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("DESKBOT_MAIL_RELAY_URL") {
            self.mail.relay_url = Some(value);
        }
        if let Some(value) = read_env("DESKBOT_MAIL_RELAY_TOKEN") {
            self.mail.relay_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("DESKBOT_MAIL_SENDER_EMAIL") {
            self.mail.sender_email = value;
        }
        if let Some(value) = read_env("DESKBOT_MAIL_RECIPIENT_EMAIL") {
            self.mail.recipient_email = value;
        }
        if let Some(value) = read_env("DESKBOT_MAIL_EMAIL_TITLE") {
            self.mail.email_title = value;
        }
        if let Some(value) = read_env("DESKBOT_MAIL_SHOW_SENDER_NAME_IN_EMAIL_TITLE") {
            self.mail.show_sender_name_in_email_title =
                parse_bool("DESKBOT_MAIL_SHOW_SENDER_NAME_IN_EMAIL_TITLE", &value)?;
        }

        if let Some(value) = read_env("DESKBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DESKBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DESKBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("DESKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DESKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DESKBOT_LOGGING_LEVEL").or_else(|| read_env("DESKBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DESKBOT_LOGGING_FORMAT").or_else(|| read_env("DESKBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(host) = overrides.bot_host {
            self.bot.host = host;
        }
        if let Some(attachments_dir) = overrides.attachments_dir {
            self.storage.attachments_dir = attachments_dir;
        }
        if let Some(relay_url) = overrides.mail_relay_url {
            self.mail.relay_url = Some(relay_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bot(&self.bot)?;
        validate_database(&self.database)?;
        validate_limits(&self.limits)?;
        validate_storage(&self.storage)?;
        validate_mail(&self.mail)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deskbot.toml"), PathBuf::from("config/deskbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    if bot.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "bot.host is required (the messenger host the bot account is registered on)"
                .to_string(),
        ));
    }
    if bot.bot_id.trim().is_empty() {
        return Err(ConfigError::Validation("bot.bot_id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.max_attachments_count == 0 {
        return Err(ConfigError::Validation(
            "limits.max_attachments_count must be greater than zero".to_string(),
        ));
    }
    if limits.max_attachment_size == 0 {
        return Err(ConfigError::Validation(
            "limits.max_attachment_size must be greater than zero".to_string(),
        ));
    }
    if limits.max_attachments_size < limits.max_attachment_size {
        return Err(ConfigError::Validation(
            "limits.max_attachments_size must not be smaller than limits.max_attachment_size"
                .to_string(),
        ));
    }
    if limits.max_description_length == 0 {
        return Err(ConfigError::Validation(
            "limits.max_description_length must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.attachments_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.attachments_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.email_title.trim().is_empty() {
        return Err(ConfigError::Validation("mail.email_title must not be empty".to_string()));
    }

    let Some(relay_url) = &mail.relay_url else {
        return Ok(());
    };

    if !relay_url.starts_with("http://") && !relay_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mail.relay_url must start with http:// or https://".to_string(),
        ));
    }
    if !mail.recipient_email.contains('@') {
        return Err(ConfigError::Validation(
            "mail.recipient_email must be an e-mail address when mail.relay_url is set"
                .to_string(),
        ));
    }
    if !mail.sender_email.contains('@') {
        return Err(ConfigError::Validation(
            "mail.sender_email must be an e-mail address when mail.relay_url is set".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ByteSizePatch {
    Bytes(u64),
    Text(String),
}

impl ByteSizePatch {
    fn into_bytes(self) -> Result<u64, ConfigError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Text(text) => parse_byte_size(&text),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bot: Option<BotPatch>,
    database: Option<DatabasePatch>,
    limits: Option<LimitsPatch>,
    storage: Option<StoragePatch>,
    mail: Option<MailPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    app_name: Option<String>,
    host: Option<String>,
    bot_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitsPatch {
    max_attachments_count: Option<usize>,
    max_attachment_size: Option<ByteSizePatch>,
    max_attachments_size: Option<ByteSizePatch>,
    max_description_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    attachments_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    relay_url: Option<String>,
    relay_token: Option<String>,
    sender_email: Option<String>,
    recipient_email: Option<String>,
    email_title: Option<String>,
    show_sender_name_in_email_title: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
