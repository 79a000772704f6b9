use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use sekai_stickers::render::EngineLauncher;
use sekai_stickers::{PlacementOverrides, StickerConfig, StickerError, StickerService};

#[derive(Parser, Debug)]
#[command(name = "sekai-stickers", version, about = "Project Sekai sticker generator")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log everything
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the catalog, sticker images and font
    Prepare,
    /// Render a single sticker as PNG
    Render(RenderArgs),
    /// Render the sticker list as JPEG, one character or all of them
    List(ListArgs),
    /// Render the usage panel as JPEG
    HelpImage(OutputArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Sticker text, the sticker's default text when empty
    text: Vec<String>,

    /// Sticker id, random when omitted
    #[arg(short = 'i', long = "id")]
    id: Option<String>,

    /// Center x of the text, `^n` offsets the default
    #[arg(short = 'x', allow_hyphen_values = true)]
    x: Option<String>,

    /// Center y of the text, `^n` offsets the default
    #[arg(short = 'y', allow_hyphen_values = true)]
    y: Option<String>,

    /// Rotation in degrees
    #[arg(short = 'r', long = "rotate", allow_hyphen_values = true)]
    rotate: Option<String>,

    /// Font size, auto-fitted when omitted
    #[arg(short = 's', long = "size", allow_hyphen_values = true)]
    size: Option<String>,

    /// Text color (hex)
    #[arg(short = 'c', long = "color")]
    color: Option<String>,

    /// Stroke width
    #[arg(short = 'W', long = "stroke-width", allow_hyphen_values = true)]
    stroke_width: Option<String>,

    /// Stroke color (hex)
    #[arg(short = 'C', long = "stroke-color")]
    stroke_color: Option<String>,

    /// Line spacing
    #[arg(short = 'S', long = "line-spacing", allow_hyphen_values = true)]
    line_spacing: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Character to list, all characters when omitted
    character: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output image path
    #[arg(short = 'o', long = "out")]
    out: PathBuf,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StickerConfig> {
    let config = match path.map(Path::to_path_buf).or_else(StickerConfig::config_path) {
        Some(path) => StickerConfig::load(&path)
            .with_context(|| format!("load configuration '{}'", path.display()))?,
        None => StickerConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn launcher() -> Arc<dyn EngineLauncher> {
    #[cfg(feature = "chromium")]
    {
        Arc::new(sekai_stickers::render::ChromiumLauncher)
    }
    #[cfg(not(feature = "chromium"))]
    {
        Arc::new(sekai_stickers::render::NoEngine)
    }
}

async fn write_output(path: &Path, image: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, image)
        .await
        .with_context(|| format!("write image '{}'", path.display()))?;
    tracing::info!("Wrote {} byte(s) to {}", image.len(), path.display());
    Ok(())
}

async fn run(service: &StickerService, cmd: Command) -> anyhow::Result<()> {
    service.prepare_resources().await.map_err(report)?;

    match cmd {
        Command::Prepare => {
            tracing::info!("Prepared {} sticker(s)", service.catalog().snapshot().len());
            Ok(())
        }
        Command::Render(args) => {
            let sticker = service.pick_sticker(args.id.as_deref()).map_err(report)?;
            let text = (!args.text.is_empty()).then(|| args.text.join(" "));
            let overrides = PlacementOverrides {
                x: args.x,
                y: args.y,
                rotate: args.rotate,
                font_size: args.size,
                font_color: args.color,
                stroke_width: args.stroke_width,
                stroke_color: args.stroke_color,
                line_spacing: args.line_spacing,
            };

            let image = service
                .render_sticker(&sticker, text.as_deref(), &overrides)
                .await
                .map_err(report)?;
            write_output(&args.output.out, &image).await
        }
        Command::List(args) => {
            let image = match args.character.as_deref() {
                Some(character) => service
                    .render_character_grid(character)
                    .await
                    .map_err(report)?
                    .with_context(|| format!("no stickers found for character `{character}`"))?,
                None => service.render_all_characters_grid().await.map_err(report)?,
            };
            write_output(&args.output.out, &image).await
        }
        Command::HelpImage(output) => {
            let image = service.render_help().await.map_err(report)?;
            write_output(&output.out, &image).await
        }
    }
}

/// Log the failing stage and turn the error into a user-facing one
fn report(error: StickerError) -> anyhow::Error {
    tracing::error!("Failed during {}: {}", error.stage(), error);
    tracing::debug!("Error details: {:?}", error);
    anyhow::anyhow!(error.user_message())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::debug!("sekai-stickers {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    let service = StickerService::new(config, launcher())?;

    let result = run(&service, cli.cmd).await;
    service.shutdown().await;
    result
}
