//! Epsilon CLI - render scenes and manage render configuration.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use epsilon::engine::RenderConfig;
use epsilon::scene::{example_box, write_geometry};

#[derive(Parser)]
#[command(name = "epsilon", version, about = "Spectral path tracer on compute devices")]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene
    Render {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        overrides: Overrides,

        /// Also save it to the per-user config file
        #[arg(long)]
        save: bool,
    },

    /// Write the example box scene to a directory
    Example {
        #[arg()]
        dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct Overrides {
    /// Configuration file (default: per-user render.json, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene directory
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Output image (.ppm or .hdr)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Kernel source file
    #[arg(short, long)]
    kernel: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(short, long)]
    passes: Option<usize>,

    /// Adapter index
    #[arg(short, long)]
    device: Option<usize>,
}

impl Overrides {
    fn resolve(&self) -> Result<RenderConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| RenderConfig::default_path().filter(|p| p.exists()));
        let mut config = match path {
            Some(path) => RenderConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RenderConfig::default(),
        };

        if let Some(scene) = &self.scene {
            config.scene = scene.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(kernel) = &self.kernel {
            config.kernel = kernel.clone();
        }
        if let Some(w) = self.width {
            config.width = w;
        }
        if let Some(h) = self.height {
            config.height = h;
        }
        if let Some(p) = self.passes {
            config.passes = p;
        }
        if self.device.is_some() {
            config.device = self.device;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install the fmt subscriber, plus a Chrome trace layer when
/// `EPSILON_TRACE=1`.
fn init_tracing(verbose: u8, quiet: bool) -> Option<tracing_chrome::FlushGuard> {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = fmt::layer().with_target(false).with_filter(filter);

    if std::env::var("EPSILON_TRACE").ok().as_deref() == Some("1") {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("trace.json")
            .build();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(chrome_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(fmt_layer).init();
        None
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _trace_guard = init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Render { overrides } => cmd_render(overrides.resolve()?),
        Commands::Config { overrides, save } => cmd_config(overrides.resolve()?, save),
        Commands::Example { dir } => cmd_example(&dir),
    }
}

#[cfg(feature = "gpu")]
fn cmd_render(config: RenderConfig) -> Result<()> {
    use std::sync::Arc;

    use epsilon::backend::WgpuBackend;
    use epsilon::engine::{run, Renderer, TracingSink};

    let output = config.output.clone();
    let backend = Arc::new(WgpuBackend::new(config.device).context("opening compute device")?);
    let renderer = Renderer::new(config, backend).context("initializing renderer")?;
    let stats = run(renderer, &mut TracingSink).context("rendering")?;
    tracing::info!(
        "wrote {} after {:.1}s",
        output.display(),
        stats.elapsed_seconds
    );
    Ok(())
}

#[cfg(not(feature = "gpu"))]
fn cmd_render(_config: RenderConfig) -> Result<()> {
    anyhow::bail!("rendering needs a compute device. Rebuild with: cargo build --features gpu")
}

fn cmd_config(config: RenderConfig, save: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config)?);
    if save {
        let path = RenderConfig::default_path().context("no per-user config directory")?;
        config.save(&path)?;
        tracing::info!("saved {}", path.display());
    }
    Ok(())
}

fn cmd_example(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let geometry = File::create(dir.join("geometry"))?;
    write_geometry(BufWriter::new(geometry), &example_box())?;

    let camera = serde_json::json!({
        "position": [0.0, 0.0, -14.9],
        "target": [0.0, 0.0, 0.0],
        "field_of_view": 45.0,
    });
    std::fs::write(dir.join("camera.json"), serde_json::to_string_pretty(&camera)?)?;

    let materials = serde_json::json!({
        "atmosphere": 0,
        "models": { "floor": 1, "left": 2, "right": 3 },
    });
    std::fs::write(dir.join("materials.json"), serde_json::to_string_pretty(&materials)?)?;

    tracing::info!("example scene written to {}", dir.display());
    Ok(())
}
