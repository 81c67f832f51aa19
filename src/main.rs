//! shm-present
//!
//! Minimal Wayland client that shows an image in a maximized toplevel,
//! painted into shared-memory buffers and redrawn on every frame callback.

mod config;
mod display;
mod error;
mod pixels;
mod present;
mod shutdown;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use display::Display;
use shutdown::ShutdownToken;

const USAGE: &str = "\
Usage: shm-present [OPTIONS]

Options:
  -i, --image <PATH>    Image to present (overrides the config file)
  -c, --config <PATH>   Config file (default: ~/.config/shm-present/config.toml)
  -h, --help            Print this help";

#[derive(Debug, Default, PartialEq)]
struct Args {
    image: Option<PathBuf>,
    config: Option<PathBuf>,
    help: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-i" | "--image" => {
                    parsed.image = Some(args.next().context("--image needs a path")?.into());
                }
                "-c" | "--config" => {
                    parsed.config = Some(args.next().context("--config needs a path")?.into());
                }
                "-h" | "--help" => parsed.help = true,
                other => bail!("unexpected argument `{}`\n\n{}", other, USAGE),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shm_present=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    info!("Starting shm-present");

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(image) = args.image {
        config.image.path = image;
    }
    config.validate()?;

    let shutdown = ShutdownToken::new();
    shutdown::install_signal_handlers(shutdown.clone())
        .context("Failed to install signal handlers")?;

    let mut display = Display::connect(shutdown.clone())?;
    display
        .enumerate_and_bind()
        .context("Compositor is missing required capabilities")?;
    display.create_window(&config)?;

    if display.await_configure().await? {
        display
            .present_first_frame()
            .context("Failed to present first frame")?;
        display.run().await?;
    }

    info!("Exiting");
    display.teardown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_image_and_config() {
        let args = parse(&["--image", "/tmp/a.png", "-c", "/tmp/c.toml"]).unwrap();
        assert_eq!(args.image, Some(PathBuf::from("/tmp/a.png")));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(!args.help);
    }

    #[test]
    fn test_help() {
        assert!(parse(&["-h"]).unwrap().help);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse(&["--image"]).is_err());
        assert!(parse(&["--fullscreen"]).is_err());
    }
}
