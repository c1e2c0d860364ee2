use std::fmt::Write as _;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    config::Config,
    dpi::{DPI_TABLE, DpiScaleInfo},
    engine::DisplayEngine,
    error::DisplayError,
    platform::PlatformDisplayApi,
};

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Show the DPI scale of every monitor
    List,
    /// Set a monitor's DPI scale; applied immediately, no sign-out needed
    Set {
        /// Percentage, one of 100, 125, 150, 175, 200, 225, 250, 300, 350, 400, 450, 500
        percent: u32,
        /// 1-based monitor number
        #[arg(short, long)]
        monitor: Option<usize>,
    },
}

impl Command {
    pub fn run<A: PlatformDisplayApi>(
        &self,
        engine: &DisplayEngine<A>,
        config: &Config,
    ) -> Result<Option<i32>> {
        match self {
            Command::List => {
                for summary in engine.summaries()? {
                    match summary.scale {
                        Some(scale) => print!(
                            "{}",
                            format_scale(summary.index, summary.source.label(), &scale)
                        ),
                        None => warn!(
                            "Monitor {} ({}) does not report a DPI scale",
                            summary.index,
                            summary.source.label()
                        ),
                    }
                }
                Ok(Some(0))
            }
            Command::Set { percent, monitor } => {
                let monitor = monitor.unwrap_or(config.default_monitor);
                let applied = engine.set_scale(monitor, *percent).inspect_err(|e| {
                    if matches!(e, DisplayError::UnsupportedDpi { .. }) {
                        info!("Supported scales: {}", supported_percentages());
                    }
                })?;
                if applied != *percent {
                    warn!(
                        "{}% is outside the range monitor {} accepts, using {}%",
                        percent, monitor, applied
                    );
                }
                info!("Monitor {} is now scaled to {}%", monitor, applied);
                Ok(Some(0))
            }
        }
    }
}

fn format_scale(index: usize, label: &str, scale: &DpiScaleInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", index, label);
    let _ = writeln!(out, "   current:     {}%", scale.current_percent);
    let _ = writeln!(out, "   recommended: {}%", scale.recommended_percent);
    let choices: Vec<String> = scale
        .available()
        .into_iter()
        .map(|choice| match (choice.current, choice.recommended) {
            (true, _) => format!("[{}%]", choice.percent),
            (false, true) => format!("{}%*", choice.percent),
            (false, false) => format!("{}%", choice.percent),
        })
        .collect();
    let _ = writeln!(out, "   available:   {}", choices.join(" "));
    out
}

fn supported_percentages() -> String {
    DPI_TABLE
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fake::{FakeDisplayApi, source},
        platform::RawDpiScale,
    };

    #[test]
    fn scale_listing_marks_current_and_recommended() {
        let scale = DpiScaleInfo::from_relative(RawDpiScale {
            min_rel: -1,
            cur_rel: 1,
            max_rel: 2,
        });
        assert_eq!(
            format_scale(1, "Built-in display", &scale),
            "1: Built-in display\n\
             \x20  current:     150%\n\
             \x20  recommended: 125%\n\
             \x20  available:   100% 125%* [150%] 175%\n"
        );
    }

    #[test]
    fn unsupported_percentage_fails_without_touching_the_monitor() {
        let display = source(1, r"\\.\DISPLAY1");
        let mut api = FakeDisplayApi::new();
        api.add_source(display.clone());
        api.set_dpi(
            &display,
            RawDpiScale {
                min_rel: -2,
                cur_rel: 0,
                max_rel: 2,
            },
        );
        let engine = DisplayEngine::new(api);
        let command = Command::Set {
            percent: 110,
            monitor: None,
        };
        let err = command.run(&engine, &Config::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DisplayError>(),
            Some(&DisplayError::UnsupportedDpi { percent: 110 })
        );
        assert_eq!(engine.scale_info(1).unwrap().current_percent, 150);

        let command = Command::Set {
            percent: 175,
            monitor: None,
        };
        assert_eq!(command.run(&engine, &Config::default()).unwrap(), Some(0));
        assert_eq!(engine.scale_info(1).unwrap().current_percent, 175);
    }

    #[test]
    fn supported_percentages_list_the_table() {
        assert!(supported_percentages().starts_with("100, 125, 150"));
        assert!(supported_percentages().ends_with("450, 500"));
    }
}
