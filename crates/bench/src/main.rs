//! FrameBench - runs a rendering scenario and reports frame rates on stdout.
//!
//! Usage: `framebench [SCENARIO] [--headless] [--frames N]`
//!
//! `SCENARIO` is a built-in name (`water`, `models`, `particles`) or a path to a
//! scenario `.ron` file. Assets of a scenario file are resolved relative to it.

mod config;
mod scenarios;

use std::path::Path;

use anyhow::{bail, Context, Result};
use input::{HeadlessWindow, WindowService, WindowSettings, WinitWindow};
use renderer::{GpuDevice, GraphicsDevice, RecordingDevice, ShaderLibrary};
use scene::{AssetLoader, FsAssetLoader, RenderingInstance, RunReport, ScenarioFile, StdoutSink};

use config::BenchConfig;

#[derive(Debug, PartialEq)]
struct Args {
    scenario: String,
    headless: bool,
    frames: Option<u64>,
}

fn parse_args(mut args: impl Iterator<Item = String>, config: &BenchConfig) -> Result<Args> {
    let mut parsed = Args {
        scenario: config.default_scenario.clone(),
        headless: config.headless,
        frames: None,
    };
    let mut scenario = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => parsed.headless = true,
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                parsed.frames = Some(value.parse().with_context(|| format!("invalid frame count '{value}'"))?);
            }
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'"),
            _ if scenario.is_some() => bail!("more than one scenario given"),
            _ => scenario = Some(arg),
        }
    }
    if let Some(scenario) = scenario {
        parsed.scenario = scenario;
    }
    Ok(parsed)
}

fn load_scenario(name: &str) -> Result<(ScenarioFile, Box<dyn AssetLoader>)> {
    if let Some(builtin) = scenarios::builtin(name) {
        log::info!("Using built-in scenario '{}'", name);
        return Ok((builtin.scenario, Box::new(builtin.assets)));
    }
    let path = Path::new(name);
    let scenario = ScenarioFile::load(path)
        .with_context(|| format!("'{name}' is neither a built-in scenario ({}) nor a readable file", scenarios::NAMES.join(", ")))?;
    let root = path.parent().unwrap_or(Path::new("."));
    log::info!("Loaded scenario {:?} ({} renderers)", path, scenario.renderers.len());
    Ok((scenario, Box::new(FsAssetLoader::new(root))))
}

fn run<D: GraphicsDevice, W: WindowService>(instance: RenderingInstance<D, W>) -> Result<RunReport> {
    let mut instance = instance.with_sink(Box::new(StdoutSink));
    let report = instance.run();
    instance.shutdown()?;
    Ok(report?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BenchConfig::load();
    let args = parse_args(std::env::args().skip(1), &config)?;
    let (mut scenario, assets) = load_scenario(&args.scenario)?;
    if let Some(frames) = args.frames {
        scenario.run.frame_limit = Some(frames);
    }
    let shaders = ShaderLibrary::from_dir(&config.shader_dir);
    let defaults = &scenario.defaults;
    let (width, height) = (defaults.window_width, defaults.window_height);

    let report = if args.headless {
        log::info!("Running headless at {}x{}", width, height);
        let device = RecordingDevice::new(width, height);
        let window = HeadlessWindow::new(width, height, config.headless_delta);
        run(RenderingInstance::from_scenario(device, window, shaders, assets, &scenario)?)?
    } else {
        let window = WinitWindow::new(WindowSettings {
            title: defaults.window_title.clone(),
            width,
            height,
            ..Default::default()
        })?;
        let handle = window.window().context("window has no native handle")?;
        let device = pollster::block_on(GpuDevice::new(handle, defaults.msaa_samples, defaults.vsync))?;
        run(RenderingInstance::from_scenario(device, window, shaders, assets, &scenario)?)?
    };

    log::info!(
        "{:?}: {} frames in {:.2}s, average {:.1} fps",
        report.outcome,
        report.frames,
        report.elapsed,
        report.average_fps()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()), &BenchConfig::default())
    }

    #[test]
    fn defaults_come_from_config() {
        let parsed = args(&[]).unwrap();
        assert_eq!(parsed.scenario, "water");
        assert!(!parsed.headless);
        assert_eq!(parsed.frames, None);
    }

    #[test]
    fn flags_and_scenario_in_any_order() {
        let parsed = args(&["--frames", "120", "scenarios/fountain.ron", "--headless"]).unwrap();
        assert_eq!(
            parsed,
            Args {
                scenario: "scenarios/fountain.ron".into(),
                headless: true,
                frames: Some(120),
            }
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(args(&["--frames"]).is_err());
        assert!(args(&["--frames", "many"]).is_err());
        assert!(args(&["--fast"]).is_err());
        assert!(args(&["water", "models"]).is_err());
    }

    #[test]
    fn shipped_scenario_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../scenarios/fountain.ron");
        let (scenario, _) = load_scenario(path).unwrap();
        assert!(!scenario.plan().unwrap().is_empty());
    }
}
