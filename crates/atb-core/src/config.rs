use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, run_waiter::WaitPolicy, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";

/// Typed configuration, read from the process environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Required secrets
    pub telegram_token: String,
    pub openai_api_key: String,
    pub assistant_id: String,

    // Backend
    pub openai_base_url: String,
    pub vision_model: String,
    pub http_timeout: Duration,

    // Run polling
    pub run_wait: WaitPolicy,

    // Telegram limits
    pub telegram_message_limit: usize,

    // Liveness endpoint; `None` disables it.
    pub health_port: Option<u16>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_token = required(&lookup, "TELEGRAM_TOKEN")?;
        let openai_api_key = required(&lookup, "OPEN_AI_TOKEN")?;
        let assistant_id = required(&lookup, "ASSISTANT_ID")?;

        let openai_base_url = lookup("OPENAI_BASE_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let vision_model = lookup("OPENAI_VISION_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());
        let http_timeout =
            Duration::from_millis(parse_u64(&lookup, "OPENAI_HTTP_TIMEOUT_MS")?.unwrap_or(30_000));

        let defaults = WaitPolicy::default();
        let run_wait = WaitPolicy {
            timeout: parse_u64(&lookup, "RUN_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            poll_interval: parse_u64(&lookup, "RUN_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_polls: match parse_u64(&lookup, "RUN_MAX_POLLS")? {
                Some(n) => u32::try_from(n).map_err(|_| {
                    Error::Config(format!("RUN_MAX_POLLS must fit in 32 bits, got {n}"))
                })?,
                None => defaults.max_polls,
            },
        };
        if run_wait.max_polls == 0 {
            return Err(Error::Config("RUN_MAX_POLLS must be at least 1".to_string()));
        }

        let telegram_message_limit = parse_u64(&lookup, "TELEGRAM_MESSAGE_LIMIT")?
            .map(|n| n as usize)
            .unwrap_or(4096)
            .clamp(1, 4096);

        let health_port = match lookup("PORT").and_then(non_empty) {
            None => None,
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                Error::Config(format!("PORT must be a valid port number, got {raw:?}"))
            })?),
        };

        Ok(Self {
            telegram_token,
            openai_api_key,
            assistant_id,
            openai_base_url,
            vision_model,
            http_timeout,
            run_wait,
            telegram_message_limit,
            health_port,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
