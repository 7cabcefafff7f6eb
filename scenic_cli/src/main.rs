mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use scenic_classic::{HeaderKind, write_scene};
use scenic_core::{NodeRegistry, SceneRef, SpecificationTable, Timestamp};
use scenic_manager::config::DEFAULT_CONFIG_FILE;
use scenic_manager::{ClassicLibrary, Loaded, Manager, ManagerConfig};
use scenic_nodes::Catalog;

#[derive(Parser)]
#[command(name = "scenic", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the nodes, fields and routes of a scene file
    Inspect {
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Parse a scene file and write it back in the classic encoding
    Write {
        file: PathBuf,

        /// Output file; standard output when omitted. Its extension picks the
        /// header, otherwise the input's does.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Parse a scene file and report whether it loaded
    Check { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ManagerConfig::load(&cli.config)
        .with_context(|| format!("reading configuration {}", cli.config.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    let manager = manager(config);
    match cli.command {
        Commands::Inspect { file, json } => {
            let scene = load(&manager, &file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report::scene_json(&scene))?);
            } else {
                print!("{}", report::scene_text(&scene));
            }
        }
        Commands::Write { file, out } => {
            let scene = load(&manager, &file)?;
            let header = header_for(out.as_deref().unwrap_or(&file));
            let text = write_scene(&scene, header);
            match out {
                Some(path) => {
                    fs::write(&path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!("wrote {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Check { file } => {
            let scene = load(&manager, &file)?;
            println!("{}: ok, {} nodes", file.display(), scene.nodes().len());
        }
    }
    Ok(())
}

fn manager(config: ManagerConfig) -> Manager {
    let registry = Arc::new(NodeRegistry::new());
    let classic = ClassicLibrary::from_config(
        Arc::new(Catalog),
        registry.clone(),
        Arc::new(SpecificationTable::new()),
        &config.classic,
    );
    let priority = config.classic.priority;
    let manager = Manager::new(config, registry);
    manager.register_library(Arc::new(classic), priority);
    manager
}

fn load(manager: &Manager, file: &Path) -> Result<SceneRef> {
    let loaded = manager
        .load(file, None, Timestamp::now(), None)
        .with_context(|| format!("loading {}", file.display()))?;
    match loaded {
        Loaded::Permanent(scene) => Ok(scene),
        Loaded::Transient(_) => bail!("{} loaded as a transient scene", file.display()),
    }
}

fn header_for(path: &Path) -> HeaderKind {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(HeaderKind::from_extension)
        .unwrap_or(HeaderKind::Vrml)
}
