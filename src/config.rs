use std::path::PathBuf;

use anyhow::{Context as _, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "windisplay.toml";
pub const ENV_PREFIX: &str = "WINDISPLAY_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the daily rolling log files.
    pub log_dir: PathBuf,
    /// Filter directives used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub log_to_file: bool,
    /// 1-based monitor used when a command is not given `--monitor`.
    pub default_monitor: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_filter: "info".to_owned(),
            log_to_file: false,
            default_monitor: 1,
        }
    }
}

/// Defaults, then the file next to the executable, then the file in the
/// working directory, then `WINDISPLAY_*` environment variables.
pub fn figment() -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(exe_config_path) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join(CONFIG_FILE_NAME)))
    {
        figment = figment.merge(Toml::file(exe_config_path));
    }
    figment
        .merge(Toml::file(CONFIG_FILE_NAME))
        .merge(Env::prefixed(ENV_PREFIX))
}

pub fn get() -> Result<Config, anyhow::Error> {
    let config = figment()
        .extract::<Config>()
        .context("Failed to extract config")?;
    if config.default_monitor == 0 {
        bail!("default_monitor is 1-based, 0 is not a monitor");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_apply_without_sources() {
        Jail::expect_with(|_jail| {
            let config: Config = figment().extract()?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE_NAME,
                r#"
                    log_dir = "C:/ProgramData/windisplay"
                    log_to_file = true
                    default_monitor = 2
                "#,
            )?;
            let config: Config = figment().extract()?;
            assert_eq!(config.log_dir, PathBuf::from("C:/ProgramData/windisplay"));
            assert!(config.log_to_file);
            assert_eq!(config.default_monitor, 2);
            assert_eq!(config.log_filter, "info");

            jail.set_env("WINDISPLAY_DEFAULT_MONITOR", "3");
            jail.set_env("WINDISPLAY_LOG_FILTER", "windisplay=debug");
            let config: Config = figment().extract()?;
            assert_eq!(config.default_monitor, 3);
            assert_eq!(config.log_filter, "windisplay=debug");
            Ok(())
        });
    }

    #[test]
    fn monitor_zero_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("WINDISPLAY_DEFAULT_MONITOR", "0");
            assert!(get().is_err());
            Ok(())
        });
    }
}
