use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

/// Typed runtime configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    /// Durable Store location (full JSON snapshot).
    pub state_file: PathBuf,

    /// Deadline for any single transport call.
    pub send_timeout: Duration,

    /// Tell visitors their message reached the owner.
    pub acknowledge_visitors: bool,

    pub throttle: ThrottleConfig,

    /// Extra pause between broadcast recipients; zero leaves pacing to `throttle`.
    pub broadcast_pacing: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let state_file = env_str("STATE_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./orb-state.json"));

        let send_timeout = Duration::from_millis(env_u64("SEND_TIMEOUT_MS").unwrap_or(15_000));
        if send_timeout.is_zero() {
            return Err(Error::Config(
                "SEND_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let acknowledge_visitors = env_bool("ACK_VISITORS").unwrap_or(true);

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: env_u64("THROTTLE_GLOBAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: env_u64("THROTTLE_PER_CHAT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        let broadcast_pacing = Duration::from_millis(env_u64("BROADCAST_PACING_MS").unwrap_or(0));

        Ok(Self {
            telegram_bot_token,
            state_file,
            send_timeout,
            acknowledge_visitors,
            throttle,
            broadcast_pacing,
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

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
