use std::fmt::Write as _;

use anyhow::{Context as _, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    engine::{AppliedMode, DisplayEngine, SourceModes, SourceSummary},
    mode::{DisplayMode, Resolution, ResolutionGroups, refresh_matches},
    platform::PlatformDisplayApi,
};

pub mod scale;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// List active monitors with their current mode and DPI scale
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the resolutions and refresh rates a monitor supports
    Modes {
        /// 1-based monitor number
        #[arg(short, long)]
        monitor: Option<usize>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Change a monitor's resolution, keeping its preferred refresh rate when possible
    SetResolution {
        width: u32,
        height: u32,
        /// Use this exact refresh rate if the monitor offers it at this resolution
        #[arg(short, long)]
        refresh_hz: Option<u32>,
        /// 1-based monitor number
        #[arg(short, long)]
        monitor: Option<usize>,
    },
    /// Change a monitor's refresh rate at its current resolution
    SetRefresh {
        refresh_hz: u32,
        /// 1-based monitor number
        #[arg(short, long)]
        monitor: Option<usize>,
    },
    /// Inspect or change per-monitor DPI scaling
    #[command(subcommand)]
    Scale(scale::Command),
}

impl Default for Command {
    fn default() -> Self {
        Command::List { json: false }
    }
}

impl Command {
    pub fn run<A: PlatformDisplayApi>(
        &self,
        engine: &DisplayEngine<A>,
        config: &Config,
    ) -> Result<Option<i32>> {
        let command_debug = format!("{:?}", self);
        debug!("Running command: {}", command_debug);
        let result = self.run_inner(engine, config);
        if let Err(ref e) = result {
            error!("Command failed: {}", e);
        }
        result.with_context(|| format!("Command failed: {}", command_debug))
    }

    fn run_inner<A: PlatformDisplayApi>(
        &self,
        engine: &DisplayEngine<A>,
        config: &Config,
    ) -> Result<Option<i32>> {
        let monitor = |monitor: &Option<usize>| monitor.unwrap_or(config.default_monitor);
        match self {
            Command::List { json } => {
                let summaries = engine.summaries()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&summaries)?);
                } else if summaries.is_empty() {
                    info!("No active monitors found");
                } else {
                    print!("{}", format_summaries(&summaries));
                }
                Ok(Some(0))
            }
            Command::Modes { monitor: m, json } => {
                let report = ModesReport::new(engine.modes(monitor(m))?);
                if *json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", report.format());
                }
                Ok(Some(0))
            }
            Command::SetResolution {
                width,
                height,
                refresh_hz,
                monitor: m,
            } => {
                let applied = match refresh_hz {
                    Some(refresh_hz) => engine.set_mode(monitor(m), *width, *height, *refresh_hz)?,
                    None => engine.set_resolution(monitor(m), Resolution::new(*width, *height))?,
                };
                log_applied(&applied);
                Ok(Some(0))
            }
            Command::SetRefresh {
                refresh_hz,
                monitor: m,
            } => {
                let applied = engine.set_refresh_rate(monitor(m), *refresh_hz)?;
                log_applied(&applied);
                Ok(Some(0))
            }
            Command::Scale(scale_command) => scale_command.run(engine, config),
        }
    }
}

fn log_applied(applied: &AppliedMode) {
    info!(
        "{} is now running {} ({:?})",
        applied.source.label(),
        applied.mode,
        applied.outcome
    );
}

fn format_mode(mode: Option<&DisplayMode>) -> String {
    match mode {
        Some(mode) => format!("{}, {} bpp", mode, mode.bits_per_pixel),
        None => "unknown".to_owned(),
    }
}

pub fn format_summaries(summaries: &[SourceSummary]) -> String {
    let mut out = String::new();
    for summary in summaries {
        let _ = writeln!(
            out,
            "{}: {} ({})",
            summary.index,
            summary.source.label(),
            summary.source.device_name
        );
        let _ = writeln!(out, "   mode:  {}", format_mode(summary.current_mode.as_ref()));
        if let Some(scale) = &summary.scale {
            let _ = writeln!(
                out,
                "   scale: {}% (recommended {}%, {}%..={}%)",
                scale.current_percent,
                scale.recommended_percent,
                scale.min_percent,
                scale.max_percent
            );
        }
    }
    out
}

/// What `modes` shows: the catalog grouped the way a menu would present it.
#[derive(Debug, Clone, Serialize)]
struct ModesReport {
    #[serde(flatten)]
    modes: SourceModes,
    resolutions: ResolutionGroups,
    refresh_rates: Vec<u32>,
}

impl ModesReport {
    fn new(modes: SourceModes) -> Self {
        let current_resolution = modes.current_mode.map(|m| m.resolution());
        let resolutions = modes.modes.group_resolutions(modes.current_mode.as_ref());
        let mut refresh_rates: Vec<u32> = modes
            .modes
            .iter()
            .filter(|m| Some(m.resolution()) == current_resolution)
            .map(|m| m.refresh_hz)
            .collect();
        if refresh_rates.is_empty() {
            refresh_rates = modes.modes.refresh_rates();
        }
        refresh_rates.dedup();
        Self {
            modes,
            resolutions,
            refresh_rates,
        }
    }

    fn format(&self) -> String {
        let current = self.modes.current_mode;
        let selected_hz = self
            .modes
            .preferred_refresh_hz
            .or(current.map(|m| m.refresh_hz));
        let largest = self.modes.modes.largest().map(|m| m.resolution());
        let resolution_line = |out: &mut String, resolution: &Resolution| {
            let marker = if current.map(|m| m.resolution()) == Some(*resolution) {
                '*'
            } else {
                ' '
            };
            let mut notes = Vec::new();
            if let Some(label) = resolution.label() {
                notes.push(label.to_owned());
            }
            let (w, h) = resolution.aspect_ratio();
            notes.push(format!("{}:{}", w, h));
            if largest == Some(*resolution) {
                notes.push("max".to_owned());
            }
            let _ = writeln!(out, "  {} {} ({})", marker, resolution, notes.join(", "));
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} ({})",
            self.modes.source.label(),
            self.modes.source.device_name
        );
        let _ = writeln!(out, "Current: {}", format_mode(current.as_ref()));
        let _ = writeln!(out, "Popular resolutions:");
        for resolution in &self.resolutions.popular {
            resolution_line(&mut out, resolution);
        }
        if !self.resolutions.other.is_empty() {
            let _ = writeln!(out, "Other resolutions:");
            for resolution in &self.resolutions.other {
                resolution_line(&mut out, resolution);
            }
        }
        let _ = writeln!(out, "Refresh rates:");
        for &hz in &self.refresh_rates {
            let marker = match selected_hz {
                Some(selected) if refresh_matches(hz, selected) => '*',
                _ => ' ',
            };
            let _ = writeln!(out, "  {} {}Hz", marker, hz);
        }
        out
    }
}
