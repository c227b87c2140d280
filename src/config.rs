//! Service configuration, loaded from environment variables.
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use chrono::FixedOffset;

use crate::error::{config, AppResult};

pub const DEFAULT_APK_URL: &str =
    "https://github.com/Flamiano/moneyga-app/releases/download/v1.0.0/MoneyGa.apk";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the managed backend (REST + realtime).
    pub supabase_url: String,
    /// Public API key, sent both as `apikey` and as bearer token.
    pub anon_key: String,
    pub bind_addr: SocketAddr,
    pub presence_channel: String,
    pub apk_url: String,
    pub geo_lookup_url: String,
    pub default_location: String,
    /// Presentation timezone for growth day labels.
    pub growth_offset: FixedOffset,
    pub growth_refresh: Duration,
    /// Consecutive failed connects before a presence session reports `error`.
    pub presence_max_retries: u32,
    pub lookup_limit: u32,
    pub lookup_window: Duration,
    /// Peers whose `X-Forwarded-For` is believed. Empty means the socket peer is the client.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |k: &str| var(k).ok_or_else(|| config(format!("{k} env var is required")));

        let offset_minutes: i32 = parse_or(&var, "GROWTH_UTC_OFFSET_MINUTES", 480)?;
        let growth_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| config(format!("GROWTH_UTC_OFFSET_MINUTES out of range: {offset_minutes}")))?;

        let refresh_secs: u64 = parse_or(&var, "GROWTH_REFRESH_SECS", 300)?;
        if refresh_secs == 0 {
            return Err(config("GROWTH_REFRESH_SECS must be positive"));
        }

        let trusted_proxies = var("TRUSTED_PROXIES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| p.parse::<IpAddr>().map_err(|e| config(format!("TRUSTED_PROXIES={p}: {e}"))))
                    .collect::<AppResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            anon_key: required("SUPABASE_ANON_KEY")?,
            bind_addr: parse_or(&var, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            presence_channel: var("PRESENCE_CHANNEL").unwrap_or_else(|| "online-status".into()),
            apk_url: var("APK_URL").unwrap_or_else(|| DEFAULT_APK_URL.into()),
            geo_lookup_url: var("GEO_LOOKUP_URL")
                .unwrap_or_else(|| "https://ipapi.co".into())
                .trim_end_matches('/')
                .to_string(),
            default_location: var("DEFAULT_LOCATION").unwrap_or_else(|| "Quezon City, PH".into()),
            growth_offset,
            growth_refresh: Duration::from_secs(refresh_secs),
            presence_max_retries: parse_or(&var, "PRESENCE_MAX_RETRIES", 5)?,
            lookup_limit: parse_or(&var, "LOOKUP_LIMIT", 10)?,
            lookup_window: Duration::from_secs(parse_or(&var, "LOOKUP_WINDOW_SECS", 60)?),
            trusted_proxies,
        })
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let base = self
            .supabase_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.anon_key)
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e| config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> AppResult<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(move |k| map.get(k).cloned())
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let err = load(&[("SUPABASE_URL", "https://x.supabase.co")]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));

        let err = load(&[("SUPABASE_URL", "  "), ("SUPABASE_ANON_KEY", "k")]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("SUPABASE_URL", "https://x.supabase.co/"), ("SUPABASE_ANON_KEY", "k")]).unwrap();
        assert_eq!(cfg.supabase_url, "https://x.supabase.co");
        assert_eq!(cfg.presence_channel, "online-status");
        assert_eq!(cfg.apk_url, DEFAULT_APK_URL);
        assert_eq!(cfg.default_location, "Quezon City, PH");
        assert_eq!(cfg.growth_offset.local_minus_utc(), 8 * 3600);
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert_eq!(cfg.presence_max_retries, 5);
        assert!(cfg.trusted_proxies.is_empty());
    }

    #[test]
    fn trusted_proxies_are_parsed() {
        let cfg = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "k"),
            ("TRUSTED_PROXIES", "10.0.0.1, ::1"),
        ])
        .unwrap();
        assert_eq!(cfg.trusted_proxies, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);

        let err = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "k"),
            ("TRUSTED_PROXIES", "proxy.local"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("TRUSTED_PROXIES"));
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "k"),
            ("GROWTH_REFRESH_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, crate::error::AppErr::Config(_)));
    }

    #[test]
    fn realtime_url_switches_scheme() {
        let cfg = load(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_ANON_KEY", "k")]).unwrap();
        assert_eq!(
            cfg.realtime_url(),
            "wss://x.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }
}
