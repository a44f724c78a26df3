use std::env;
use std::path::PathBuf;

/// Gateway polled when neither `--base-url` nor the environment override is
/// given; matches a locally running platform gateway.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8484";

const DEFAULT_PAGE_SIZE: usize = 100;

/// Resolved runtime settings for one invocation: CLI flags layered over
/// `MEDIASYNC_*` environment variables over defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub base_url: String,
    pub session_name: String,
    pub output_root: PathBuf,
    pub page_size: usize,
}

impl SyncConfig {
    pub fn resolve(
        api_id: i32,
        api_hash: String,
        session_name: String,
        base_url: Option<String>,
        output_root: PathBuf,
        page_size: Option<usize>,
    ) -> Self {
        let base_url = base_url
            .or_else(|| env::var("MEDIASYNC_BASE_URL").ok())
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let page_size = page_size
            .or_else(|| {
                env::var("MEDIASYNC_PAGE_SIZE")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
            })
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self {
            api_id,
            api_hash,
            base_url,
            session_name,
            output_root,
            page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_defaults() {
        let config = SyncConfig::resolve(
            11,
            "hash".into(),
            "media_sync".into(),
            Some("https://gw.example.net".into()),
            PathBuf::from("downloads"),
            Some(25),
        );
        assert_eq!(config.base_url, "https://gw.example.net");
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = SyncConfig::resolve(
            11,
            "hash".into(),
            "media_sync".into(),
            None,
            PathBuf::from("downloads"),
            None,
        );
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn zero_page_size_falls_back() {
        let config = SyncConfig::resolve(
            11,
            "hash".into(),
            "media_sync".into(),
            None,
            PathBuf::from("downloads"),
            Some(0),
        );
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}
