use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use toml;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub event_fetcher: FetcherConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    // Base URL of the REST API, no trailing slash
    pub api_base_url: String,
    // Base URL used to build issue deep links in the export
    pub web_base_url: String,
    // Hard cap on events accumulated across pages in a single run
    pub max_events: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    // Appended to the project slug to form the dated snapshot directory
    pub snapshot_suffix: String,
}

// Deployment identifiers and secrets, sourced from the environment rather
// than Config.toml so they never end up in the deployment bundle
#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub organization_id: String,
    pub project_slug: String,
    pub auth_token: String,
    pub bucket_name: String,
}

pub fn load_config(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

pub fn load_env_settings() -> Result<EnvSettings, Box<dyn std::error::Error>> {
    Ok(EnvSettings {
        organization_id: require_env("SENTRY_ORGANIZATION_ID")?,
        project_slug: require_env("SENTRY_PROJECT_SLUG")?,
        auth_token: require_env("SENTRY_AUTH_TOKEN")?,
        bucket_name: require_env("S3_BUCKET_NAME")?,
    })
}

fn require_env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name).map_err(|_| format!("environment variable {} is not set", name).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_toml() {
        let config: Config = toml::from_str(
            r#"
            [event_fetcher]
            api_base_url = "https://sentry.io/api/0"
            web_base_url = "https://sentry.io"
            max_events = 1000

            [storage]
            snapshot_suffix = "_backup"
            "#,
        )
        .unwrap();

        assert_eq!(config.event_fetcher.max_events, 1000);
        assert_eq!(config.event_fetcher.api_base_url, "https://sentry.io/api/0");
        assert_eq!(config.storage.snapshot_suffix, "_backup");
    }
}
