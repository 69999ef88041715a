use anyhow::Result;
use std::{env, path::PathBuf, process};
use tei_press_config::{Config, Manifest};
use tei_press_engine::Publisher;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Determine config path from CLI args or the default location
    let args: Vec<String> = env::args().collect();
    let config = match args.len() {
        1 => match Config::load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                eprintln!("Error: no config file found");
                eprintln!("Usage: {} [config-path]", args[0]);
                eprintln!("Or create a config file at {}", Config::config_path().display());
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: failed to load config file: {e}");
                process::exit(1);
            }
        },
        2 => match Config::load_from_path(PathBuf::from(&args[1])) {
            Ok(Some(config)) => config,
            Ok(None) => {
                eprintln!("Error: no config file at {}", args[1]);
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: failed to load config file: {e}");
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage: {} [config-path]", args[0]);
            process::exit(1);
        }
    };

    // Per-project failures are reported but never stop the batch loop
    for (name, project) in &config.projects {
        let manifest_path = project.manifest_path();
        let manifest = match Manifest::load_from_path(&manifest_path) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                warn!(project = %name, path = %manifest_path.display(), "no manifest, skipping project");
                continue;
            }
            Err(e) => {
                error!(project = %name, error = %e, "manifest could not be loaded");
                continue;
            }
        };

        let batch = manifest.to_batch(&project.file_root);
        let report = Publisher::new(&project.pipeline, &manifest).run(&batch);

        println!(
            "{name}: {} file(s) regenerated, {} failed",
            report.changed.len(),
            report.failed.len()
        );
        for path in &report.changed {
            println!("  {}", path.display());
        }
        for (path, e) in &report.failed {
            println!("  FAILED {}: {e}", path.display());
        }
    }

    Ok(())
}
