use anyhow::{Context, Result, anyhow};

use crate::pager::{DEFAULT_PAGE_SIZE, DEFAULT_SCROLL_THRESHOLD_PX};

/// Адрес backend по умолчанию.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq)]
/// Настройки клиента.
pub struct ClientSettings {
    /// Базовый URL backend.
    pub api_base_url: String,
    /// Таймаут установки соединения, секунды.
    pub connect_timeout_secs: u64,
    /// Таймаут всего запроса, секунды.
    pub request_timeout_secs: u64,
    /// Размер страницы ленты.
    pub feed_page_size: u32,
    /// Расстояние до конца документа, при котором догружается лента (px).
    pub scroll_threshold_px: f64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            feed_page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
        }
    }
}

impl ClientSettings {
    /// Читает настройки из переменных окружения `BIBLIONET_*`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = std::env::var("BIBLIONET_API_URL")
            .map(|value| value.trim().to_string())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_base_url);
        let connect_timeout_secs =
            parse_positive_env("BIBLIONET_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs)?;
        let request_timeout_secs =
            parse_positive_env("BIBLIONET_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?;
        let feed_page_size = u32::try_from(parse_positive_env(
            "BIBLIONET_FEED_PAGE_SIZE",
            u64::from(defaults.feed_page_size),
        )?)
        .context("BIBLIONET_FEED_PAGE_SIZE is too large")?;
        let scroll_threshold_px = std::env::var("BIBLIONET_SCROLL_THRESHOLD_PX")
            .unwrap_or_else(|_| defaults.scroll_threshold_px.to_string())
            .parse::<f64>()
            .context("Failed to parse BIBLIONET_SCROLL_THRESHOLD_PX, expecting number")?;

        if !scroll_threshold_px.is_finite() || scroll_threshold_px < 0.0 {
            return Err(anyhow!("BIBLIONET_SCROLL_THRESHOLD_PX must be >= 0"));
        }

        Ok(Self {
            api_base_url,
            connect_timeout_secs,
            request_timeout_secs,
            feed_page_size,
            scroll_threshold_px,
        })
    }

    /// Те же настройки с другим адресом backend.
    pub fn with_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }
}

fn parse_positive_env(key: &str, default: u64) -> Result<u64> {
    let value = std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}
