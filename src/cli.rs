//! CLI argument parsing and run setup

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use winfs_injector::archive::ZipArchiver;
use winfs_injector::defaults::{DEFAULT_BOSH_CLI, DEFAULT_IMAGE_FETCHER, DEFAULT_REGISTRY};
use winfs_injector::metadata::TileMetadataInjector;
use winfs_injector::orchestrator::{self, Application, Outcome};
use winfs_injector::release::CommandReleaseCreator;

/// winfs-injector injects the Windows root file system into the Windows Runtime tile
#[derive(Parser, Debug)]
#[command(name = "winfs-injector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to input tile (example: /path/to/input.pivotal)
    #[arg(short, long, value_name = "PATH", env = "WINFS_INJECTOR_INPUT_TILE")]
    input_tile: Option<PathBuf>,

    /// Path to output tile (example: /path/to/output.pivotal)
    #[arg(short, long, value_name = "PATH", env = "WINFS_INJECTOR_OUTPUT_TILE")]
    output_tile: Option<PathBuf>,

    /// Docker registry the root file system image is fetched from
    #[arg(
        short,
        long,
        value_name = "URL",
        env = "WINFS_INJECTOR_REGISTRY",
        default_value = DEFAULT_REGISTRY
    )]
    registry: String,

    /// Command used to download the root file system image
    #[arg(
        long,
        value_name = "COMMAND",
        env = "WINFS_INJECTOR_IMAGE_FETCHER",
        default_value = DEFAULT_IMAGE_FETCHER
    )]
    image_fetcher: String,

    /// Command used to build the release tarball
    #[arg(
        long,
        value_name = "COMMAND",
        env = "WINFS_INJECTOR_BOSH_CLI",
        default_value = DEFAULT_BOSH_CLI
    )]
    bosh_cli: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Execute the injection run
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&self.log_level))
            .format_timestamp(None)
            .try_init()?;

        let input_tile = self.input_tile.unwrap_or_default();
        let output_tile = self.output_tile.unwrap_or_default();
        orchestrator::validate_inputs(&input_tile, &output_tile)?;

        // Removed on drop, on every exit path
        let working_dir = tempfile::Builder::new()
            .prefix("winfs-injector")
            .tempdir()?;

        let app = Application::new(
            Box::new(CommandReleaseCreator::new(self.image_fetcher, self.bosh_cli)),
            Box::new(TileMetadataInjector),
            Box::new(ZipArchiver),
        );

        match app.run(&input_tile, &output_tile, &self.registry, working_dir.path())? {
            Outcome::AlreadyInjected => {
                println!("The file system has already been injected in the tile; skipping injection");
            }
            Outcome::Injected {
                release,
                output_tile,
            } => {
                info!(
                    "Injected {} {} ({}) into {}",
                    release.name,
                    release.version,
                    release.file,
                    output_tile.display()
                );
            }
        }

        Ok(())
    }
}
