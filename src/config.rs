use camino::Utf8Path;
use config::Config;

pub use ewebridge_api::config::*;

use crate::error::{ApiError, ApiResult};

/// Upper bound for timer intervals, in seconds.
pub const MAX_INTERVAL: u64 = 86_400;

pub fn parse(filename: &Utf8Path) -> ApiResult<AppConfig> {
    let settings = Config::builder()
        .set_default("name", AppConfig::DEFAULT_NAME)?
        .set_default("region", AppConfig::DEFAULT_REGION)?
        .set_default("real_time_update", false)?
        .set_default("real_time_tolerance_window", 5)?
        .set_default("poll_interval", 60)?
        .set_default("drain_interval", 5)?
        .set_default("door_travel_time", 20)?
        .set_default("cache_file", "accessories.yaml")?
        .add_source(config::File::with_name(filename.as_str()))
        .build()?;

    let conf = settings.try_deserialize()?;
    validate(&conf)?;
    Ok(conf)
}

/// Timer intervals must be non-zero and small enough to add to an `Instant`.
pub fn validate(conf: &AppConfig) -> ApiResult<()> {
    for (key, value) in [
        ("poll_interval", conf.poll_interval),
        ("drain_interval", conf.drain_interval),
    ] {
        if !(1..=MAX_INTERVAL).contains(&value) {
            return Err(ApiError::InvalidInterval {
                key,
                value,
                max: MAX_INTERVAL,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8Path;

    use crate::config::{AppConfig, MAX_INTERVAL, Transport, parse, validate};
    use crate::error::ApiError;

    fn parse_str(text: &str) -> crate::error::ApiResult<AppConfig> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "{text}").unwrap();
        parse(Utf8Path::from_path(file.path()).unwrap())
    }

    #[test]
    fn parse_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "email: user@example.com\npassword: hunter2\nreal_time_update: true\nreal_time_tolerance_window: 3"
        )
        .unwrap();

        let path = Utf8Path::from_path(file.path()).unwrap();
        let conf = parse(path).unwrap();

        assert!(conf.real_time_update);
        assert_eq!(conf.real_time_tolerance_window, 3);
        assert_eq!(conf.poll_interval, 60);
        assert_eq!(conf.cache_file, "accessories.yaml");
        assert!(matches!(conf.transport(), Transport::Remote(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse(Utf8Path::new("/nonexistent/ewebridge.yaml")).is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = parse_str("poll_interval: 0").unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidInterval {
                key: "poll_interval",
                value: 0,
                ..
            }
        ));
    }

    #[test]
    fn zero_drain_interval_is_rejected() {
        let err = parse_str("drain_interval: 0").unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidInterval {
                key: "drain_interval",
                value: 0,
                ..
            }
        ));
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        let conf = AppConfig {
            poll_interval: u64::MAX,
            ..AppConfig::default()
        };
        assert!(matches!(
            validate(&conf),
            Err(ApiError::InvalidInterval { key: "poll_interval", .. })
        ));

        let conf = AppConfig {
            drain_interval: MAX_INTERVAL + 1,
            ..AppConfig::default()
        };
        assert!(matches!(
            validate(&conf),
            Err(ApiError::InvalidInterval { key: "drain_interval", .. })
        ));

        let conf = AppConfig {
            poll_interval: MAX_INTERVAL,
            drain_interval: 1,
            ..AppConfig::default()
        };
        assert!(validate(&conf).is_ok());
    }
}
