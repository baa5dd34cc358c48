//! Configuration view and validation commands — `seoflow config`.

use anyhow::Result;
use std::path::Path;

use seoflow::config::{CONFIG_DIR, CONFIG_FILE, CliOverrides, Config, SeoflowToml};

use super::super::ConfigCommands;

fn print_toml(toml: &SeoflowToml) {
    println!("[storage]");
    match &toml.storage.root {
        Some(root) => println!("  root = \"{}\"", root.display()),
        None => println!("  root = (default: {})", CONFIG_DIR),
    }
    if let Some(profiles) = &toml.storage.profiles {
        println!("  profiles = \"{}\"", profiles.display());
    }
    println!();
    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  format = \"{}\"", toml.logging.format);
    println!("  file = {}", toml.logging.file);
    println!();
    println!("[cache]");
    println!("  capacity = {}", toml.cache.capacity);
    println!("  idle_ttl_secs = {}", toml.cache.idle_ttl_secs);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Seoflow Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&SeoflowToml::load(&config_path)?);
            } else {
                println!("No seoflow.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&SeoflowToml::default());
                println!("Run 'seoflow config init' to create a seoflow.toml file.");
                println!();
            }

            println!("Effective values (with env overrides):");
            let config = Config::new(project_dir.to_path_buf(), CliOverrides::default())?;
            println!("  root = \"{}\"", config.root.display());
            println!("  profiles = \"{}\"", config.profiles_dir.display());
            println!("  log_level = \"{}\"", config.log_level);
            println!("  log_format = \"{}\"", config.log_format);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No seoflow.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = SeoflowToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("seoflow.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config_dir)?;
            SeoflowToml::default().save(&config_path)?;

            println!("Created seoflow.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [storage] root, profiles");
            println!("  - [logging] level, format, file");
            println!("  - [cache] capacity, idle_ttl_secs");
            println!();
        }
    }

    Ok(())
}
