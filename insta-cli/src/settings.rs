use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use insta_client::ClientOptions;
use insta_dashboard::SubcategoryPolicy;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub username: Option<String>,
    pub session_cookie: Option<String>,
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub strict_subcategory_assignment: bool,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = normalize_api_url(
            get_optional(&get, "INSTA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        );
        let username = get_optional(&get, "INSTA_USERNAME");
        let session_cookie = get_optional(&get, "INSTA_SESSION_COOKIE");
        let http_connect_timeout_secs = parse_u64(&get, "HTTP_CONNECT_TIMEOUT_SECS", 5)?;
        let http_request_timeout_secs = parse_u64(&get, "HTTP_REQUEST_TIMEOUT_SECS", 15)?;
        let strict_subcategory_assignment =
            parse_bool(&get, "STRICT_SUBCATEGORY_ASSIGNMENT", false)?;
        let log_level = get_optional(&get, "LOG_LEVEL")
            .or_else(|| get_optional(&get, "RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            api_url,
            username,
            session_cookie,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            strict_subcategory_assignment,
            log_level,
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_url.clone(),
            session_cookie: self.session_cookie.clone(),
            connect_timeout: Duration::from_secs(self.http_connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http_request_timeout_secs),
        }
    }

    pub fn subcategory_policy(&self) -> SubcategoryPolicy {
        if self.strict_subcategory_assignment {
            SubcategoryPolicy::RequireMatchingParent
        } else {
            SubcategoryPolicy::Permissive
        }
    }
}

pub fn normalize_api_url(url: String) -> String {
    let url = url.trim().trim_end_matches('/').to_string();
    if url.starts_with("http://") || url.starts_with("https://") {
        return url;
    }

    format!("http://{url}")
}

fn get_optional(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let value = match get_optional(get, key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = get_optional(get, key) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Failed to parse {key}, expecting true/false")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let s = settings(&[]).expect("defaults are valid");
        assert_eq!(s.api_url, DEFAULT_API_URL);
        assert!(s.username.is_none());
        assert_eq!(s.http_connect_timeout_secs, 5);
        assert_eq!(s.http_request_timeout_secs, 15);
        assert_eq!(s.subcategory_policy(), SubcategoryPolicy::Permissive);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn log_level_wins_over_rust_log() {
        let s = settings(&[("LOG_LEVEL", "debug"), ("RUST_LOG", "warn")]).expect("valid");
        assert_eq!(s.log_level, "debug");

        let s = settings(&[("RUST_LOG", "insta_dashboard=trace")]).expect("valid");
        assert_eq!(s.log_level, "insta_dashboard=trace");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let s = settings(&[("INSTA_USERNAME", "   "), ("INSTA_SESSION_COOKIE", "")])
            .expect("valid");
        assert!(s.username.is_none());
        assert!(s.session_cookie.is_none());
    }

    #[test]
    fn strict_flag_switches_policy() {
        let s = settings(&[("STRICT_SUBCATEGORY_ASSIGNMENT", "TRUE")]).expect("valid");
        assert_eq!(s.subcategory_policy(), SubcategoryPolicy::RequireMatchingParent);

        assert!(settings(&[("STRICT_SUBCATEGORY_ASSIGNMENT", "maybe")]).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(settings(&[("HTTP_REQUEST_TIMEOUT_SECS", "0")]).is_err());
        assert!(settings(&[("HTTP_CONNECT_TIMEOUT_SECS", "abc")]).is_err());
    }

    #[test]
    fn api_url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(normalize_api_url("localhost:3000/".to_string()), "http://localhost:3000");
        assert_eq!(
            normalize_api_url("https://insta.example.com".to_string()),
            "https://insta.example.com"
        );
    }

    #[test]
    fn client_options_carry_timeouts() {
        let s = settings(&[("HTTP_REQUEST_TIMEOUT_SECS", "30"), ("INSTA_SESSION_COOKIE", "sid=1")])
            .expect("valid");
        let options = s.client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.session_cookie.as_deref(), Some("sid=1"));
    }
}
