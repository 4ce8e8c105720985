//! gesture_matrix: interactive entry point.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use gesture_matrix::app;
use gesture_matrix::config::{main_scene, music_scene, BackgroundSource, SceneConfig};
use gesture_matrix::render::OverlayText;

const DEFAULT_TITLE: &str = "Unknown Title";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SceneKind {
    Main,
    Music,
}

#[derive(Parser, Debug)]
#[command(name = "gesture_matrix", about = "Hand-gesture controlled LED matrix scenes")]
struct Cli {
    /// Scene preset; without it (and without --quick) a menu is shown
    #[arg(long, value_enum)]
    scene: Option<SceneKind>,

    /// TOML scene file; replaces the preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Looping GIF background
    #[arg(long)]
    gif: Option<PathBuf>,

    /// Still image background (album art)
    #[arg(long)]
    art: Option<PathBuf>,

    /// Static overlay text
    #[arg(long)]
    title: Option<String>,

    /// Main scene over a generated background, no questions asked
    #[arg(long)]
    quick: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║        Gesture Matrix — hand-controlled LED panel scenes     ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    #[cfg(feature = "leap")]
    println!("  Mode: LeapMotion hardware");
    #[cfg(not(feature = "leap"))]
    println!("  Mode: Keyboard simulation  (use --features leap for hardware)");
    println!();

    let cfg = build_config(&cli)?;
    info!(scene = %cfg.name, "starting scene");

    println!("  Show an open hand (Space) to start; thumb up/down to adjust.");
    println!("  Close the window, press Q, or Ctrl-C to quit.");
    println!();

    let report = app::run(cfg).context("scene failed")?;
    if !report.clean() {
        println!("  Stopped with {} loop(s) still running.", report.timed_out.len());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<SceneConfig> {
    let mut cfg = if let Some(path) = &cli.config {
        SceneConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        let mut preset = match (cli.scene, cli.quick) {
            (Some(SceneKind::Main), _) => main_scene(),
            (Some(SceneKind::Music), _) => music_scene(cli.title.as_deref().unwrap_or(DEFAULT_TITLE)),
            (None, true) => {
                println!("  Quick-start: clock over a generated background\n");
                let mut c = main_scene();
                c.background = BackgroundSource::default();
                c
            }
            (None, false) => choose_interactively(),
        };
        preset.apply_env(|key| std::env::var(key).ok());
        preset
    };

    if let Some(gif) = &cli.gif {
        cfg.background = BackgroundSource::Gif { path: gif.clone() };
    }
    if let Some(art) = &cli.art {
        cfg.background = match cfg.background {
            BackgroundSource::Still { shrink, background, .. } => {
                BackgroundSource::Still { path: art.clone(), shrink, background }
            }
            _ => BackgroundSource::Still { path: art.clone(), shrink: 0.5, background: [245, 236, 205] },
        };
    }
    if let Some(title) = &cli.title {
        cfg.overlay.text = OverlayText::Static { text: title.clone() };
    }

    cfg.validate()?;
    Ok(cfg)
}

fn choose_interactively() -> SceneConfig {
    println!("  Choose a scene:");
    println!("    1. Main   — clock over a looping GIF, thumb up/down sets brightness");
    println!("    2. Music  — song title over album art, thumb up/down sets volume,");
    println!("                open hand pauses/resumes");
    match read_line("  Choice (1–2, default 1): ").trim() {
        "2" => {
            let title = read_line(&format!("  Song title (default \"{}\"): ", DEFAULT_TITLE));
            let title = title.trim();
            music_scene(if title.is_empty() { DEFAULT_TITLE } else { title })
        }
        _ => main_scene(),
    }
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf
}
