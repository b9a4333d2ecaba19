//! Project initialization for template-sync
//!
//! `template-sync init` creates the config directory, a default config file
//! and the record store.

use crate::config::{Config, API_KEY_ENV, CONFIG_DIR};
use crate::db::Database;
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Initialize template-sync in the current directory
pub fn init_project() -> Result<(), String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Could not get current directory: {}", e))?;
    init_project_in(&cwd)
}

/// Initialize template-sync in `root`
pub fn init_project_in(root: &Path) -> Result<(), String> {
    println!("\n{}", "Initializing template-sync...".cyan().bold());
    println!("   Directory: {}\n", root.display());

    // 1. Create .template-sync directory
    let sync_dir = root.join(CONFIG_DIR);
    create_dir_if_missing(&sync_dir)?;

    // 2. Default config (never overwritten)
    let config_path = sync_dir.join("config.toml");
    write_file_if_missing(&config_path, &Config::default_toml(), ".template-sync/config.toml")?;

    // 3. Create the database by opening it
    let db_path = sync_dir.join("template-sync.db");
    let existed = db_path.exists();
    Database::open_at(&db_path).map_err(|e| format!("Could not create database: {}", e))?;
    if existed {
        println!("   {} .template-sync/template-sync.db (already exists)", "Skipping".yellow());
    } else {
        println!("   {} .template-sync/template-sync.db", "Creating".green());
    }

    // 4. Keep the database (and any key in the config) out of git
    add_to_gitignore(root)?;

    println!("\n{}", "template-sync initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Export your API key: {}", format!("export {}=...", API_KEY_ENV).cyan());
    println!("  2. Run {} to pull templates and token mappings", "template-sync sync".cyan());
    println!("  3. Run {} to map tokens to local fields", "template-sync map <id> <field>".cyan());
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content)
            .map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}

fn add_to_gitignore(root: &Path) -> Result<(), String> {
    let gitignore_path = root.join(".gitignore");
    let entry = ".template-sync/";

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?;

        if existing.lines().any(|line| line.trim() == entry || line.trim() == CONFIG_DIR) {
            return Ok(());
        }

        let new_content = format!("{}\n\n# template-sync store (local)\n{}\n", existing.trim_end(), entry);
        fs::write(&gitignore_path, new_content)
            .map_err(|e| format!("Could not update .gitignore: {}", e))?;
        println!("   {} .gitignore (added .template-sync/)", "Updated".green());
    } else {
        let content = format!("# template-sync store (local)\n{}\n", entry);
        fs::write(&gitignore_path, content)
            .map_err(|e| format!("Could not create .gitignore: {}", e))?;
        println!("   {} .gitignore", "Creating".green());
    }

    Ok(())
}
