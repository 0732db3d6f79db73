use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

/// Typed configuration.
///
/// Every key is read from `OXIDE_*` environment variables; a `.env` file in the
/// working directory is loaded first but never overrides variables already set.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub database_path: PathBuf,
    pub debug_mode: bool,

    // Dialogs
    pub dialog_timeout: Duration,
    pub settings_ack_interval: Duration,
    pub button_label_max_length: usize,

    // Outbound spacing
    pub throttle: ThrottleConfig,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let bot_token = env_str("OXIDE_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "OXIDE_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let database_path = PathBuf::from(
            env_str("OXIDE_DATABASE_PATH").unwrap_or("databases/suggestions.db".to_string()),
        );
        let debug_mode = env_str("OXIDE_DEBUG_MODE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let dialog_timeout =
            Duration::from_secs(env_u64("OXIDE_DIALOG_TIMEOUT_SECS").unwrap_or(180));
        let settings_ack_interval =
            Duration::from_millis(env_u64("OXIDE_SETTINGS_ACK_MS").unwrap_or(2000));
        let button_label_max_length = env_usize("OXIDE_BUTTON_LABEL_MAX_LENGTH").unwrap_or(30);

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: env_u64("OXIDE_THROTTLE_GLOBAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: env_u64("OXIDE_THROTTLE_CHAT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        let audit_log_path = PathBuf::from(
            env_str("OXIDE_AUDIT_LOG_PATH").unwrap_or("/tmp/oxide-audit.log".to_string()),
        );
        let audit_log_json = env_str("OXIDE_AUDIT_LOG_JSON")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Ok(Self {
            bot_token,
            database_path,
            debug_mode,
            dialog_timeout,
            settings_ack_interval,
            button_label_max_length,
            throttle,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

/// Anything except `false` / `0` counts as enabled.
fn parse_flag(s: &str) -> bool {
    !matches!(s.trim().to_lowercase().as_str(), "false" | "0")
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}
