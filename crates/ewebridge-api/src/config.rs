use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;

/// Platform configuration, as supplied by the host.
///
/// The keys are flat, matching the platform block of the host configuration
/// file. Cloud credentials are optional: without them, the bridge falls back
/// to the local network transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "AppConfig::default_region")]
    pub region: String,
    #[serde(default)]
    pub real_time_update: bool,
    #[serde(default = "AppConfig::default_tolerance_window")]
    pub real_time_tolerance_window: u64,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub api_url: Option<Url>,
    #[serde(default = "AppConfig::default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "AppConfig::default_drain_interval")]
    pub drain_interval: u64,
    #[serde(default = "AppConfig::default_door_travel_time")]
    pub door_travel_time: u64,
    #[serde(default = "AppConfig::default_cache_file")]
    pub cache_file: Utf8PathBuf,
}

/// Credentials for the cloud transport.
#[derive(Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RemoteCredentials {
    pub email: String,
    pub password: String,
    pub region: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub api_url: Option<Url>,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("email", &self.email)
            .field("password", &"<<REDACTED>>")
            .field("region", &self.region)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<<REDACTED>>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transport {
    Remote(RemoteCredentials),
    Local,
}

impl AppConfig {
    pub const DEFAULT_NAME: &'static str = "EweLink";
    pub const DEFAULT_REGION: &'static str = "us";

    fn default_name() -> String {
        Self::DEFAULT_NAME.to_string()
    }

    fn default_region() -> String {
        Self::DEFAULT_REGION.to_string()
    }

    const fn default_tolerance_window() -> u64 {
        5
    }

    const fn default_poll_interval() -> u64 {
        60
    }

    const fn default_drain_interval() -> u64 {
        5
    }

    const fn default_door_travel_time() -> u64 {
        20
    }

    fn default_cache_file() -> Utf8PathBuf {
        Utf8PathBuf::from("accessories.yaml")
    }

    /// Cloud transport when both email and password are present, local
    /// network transport otherwise.
    #[must_use]
    pub fn transport(&self) -> Transport {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Transport::Remote(RemoteCredentials {
                    email: email.clone(),
                    password: password.clone(),
                    region: self.region.clone(),
                    app_id: self.app_id.clone(),
                    app_secret: self.app_secret.clone(),
                    api_url: self.api_url.clone(),
                })
            }
            _ => Transport::Local,
        }
    }

    #[must_use]
    pub const fn tolerance_window(&self) -> Duration {
        Duration::from_secs(self.real_time_tolerance_window)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    #[must_use]
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval)
    }

    #[must_use]
    pub const fn door_travel_time(&self) -> Duration {
        Duration::from_secs(self.door_travel_time)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            email: None,
            password: None,
            region: Self::default_region(),
            real_time_update: false,
            real_time_tolerance_window: Self::default_tolerance_window(),
            app_id: None,
            app_secret: None,
            api_url: None,
            poll_interval: Self::default_poll_interval(),
            drain_interval: Self::default_drain_interval(),
            door_travel_time: Self::default_door_travel_time(),
            cache_file: Self::default_cache_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, Transport};

    #[test]
    fn empty_config_uses_defaults() {
        let conf: AppConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(conf.name, "EweLink");
        assert_eq!(conf.region, "us");
        assert!(!conf.real_time_update);
        assert_eq!(conf.real_time_tolerance_window, 5);
        assert_eq!(conf.drain_interval, 5);
        assert_eq!(conf.transport(), Transport::Local);
    }

    #[test]
    fn credentials_select_remote_transport() {
        let conf: AppConfig = serde_json::from_str(
            r#"{"email": "user@example.com", "password": "hunter2", "region": "eu"}"#,
        )
        .unwrap();

        let Transport::Remote(creds) = conf.transport() else {
            panic!("expected remote transport");
        };
        assert_eq!(creds.region, "eu");
        assert_eq!(creds.email, "user@example.com");
    }

    #[test]
    fn partial_credentials_select_local_transport() {
        let conf: AppConfig = serde_json::from_str(r#"{"email": "user@example.com"}"#).unwrap();
        assert_eq!(conf.transport(), Transport::Local);

        let conf: AppConfig =
            serde_json::from_str(r#"{"email": "", "password": "hunter2"}"#).unwrap();
        assert_eq!(conf.transport(), Transport::Local);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let conf: AppConfig = serde_json::from_str(
            r#"{"email": "user@example.com", "password": "hunter2", "app_secret": "s3cret"}"#,
        )
        .unwrap();

        let Transport::Remote(creds) = conf.transport() else {
            panic!("expected remote transport");
        };
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<<REDACTED>>"));
    }
}
