use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use template_sync::{run_sync, Config, Database, RemoteClient, SyncOptions, SyncReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "template-sync")]
#[command(author, version, about = "Sync document templates and their token field mappings into a local record store")]
struct Args {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create .template-sync/ with a default config and an empty store
    Init,

    /// Pull templates and create mappings for new tokens
    Sync {
        /// Worker threads (overrides sync.workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Minimum delay between remote requests in ms (overrides remote.request_delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List local template records
    Templates {
        #[arg(long)]
        json: bool,
    },

    /// List field mappings of a template
    Mappings {
        /// Local template id
        template_id: i32,

        /// Include inactive mappings
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Set the local field a mapping points at
    Map {
        mapping_id: i32,
        local_field: String,
    },

    /// Mark a mapping inactive
    Deactivate { mapping_id: i32 },

    /// Show recent sync runs
    Runs {
        #[arg(short = 'n', long, default_value = "10")]
        limit: i64,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match args.command {
        Command::Init => template_sync::init::init_project().map(|_| 0),
        Command::Sync {
            workers,
            delay_ms,
            json,
        } => cmd_sync(workers, delay_ms, json),
        Command::Templates { json } => cmd_templates(json).map(|_| 0),
        Command::Mappings {
            template_id,
            all,
            json,
        } => cmd_mappings(template_id, all, json).map(|_| 0),
        Command::Map {
            mapping_id,
            local_field,
        } => open_db()
            .and_then(|db| {
                db.set_local_field_name(mapping_id, &local_field)
                    .map_err(|e| e.to_string())
            })
            .map(|_| {
                println!("{} mapping {} -> {}", "Mapped".green(), mapping_id, local_field);
                0
            }),
        Command::Deactivate { mapping_id } => open_db()
            .and_then(|db| db.deactivate_field_mapping(mapping_id).map_err(|e| e.to_string()))
            .map(|_| {
                println!("{} mapping {}", "Deactivated".yellow(), mapping_id);
                0
            }),
        Command::Runs { limit } => cmd_runs(limit).map(|_| 0),
        Command::Completion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "template-sync", &mut std::io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_db() -> Result<Database, String> {
    Database::open().map_err(|e| {
        format!(
            "Could not open database at {}: {}",
            Database::db_path().display(),
            e
        )
    })
}

/// Exit code 0 on a clean run, 2 when anything was isolated as a failure
fn cmd_sync(workers: Option<usize>, delay_ms: Option<u64>, json: bool) -> Result<i32, String> {
    let mut config = Config::load().map_err(|e| e.to_string())?;
    if let Some(w) = workers {
        config.sync.workers = w;
    }
    if let Some(d) = delay_ms {
        config.remote.request_delay_ms = d;
    }

    let settings = config.remote_settings().map_err(|e| e.to_string())?;
    let client = RemoteClient::new(settings).map_err(|e| e.to_string())?;
    let db = open_db()?;
    tracing::info!(
        base_url = %client.settings().base_url,
        db = %Database::db_path().display(),
        "starting sync"
    );

    let options = SyncOptions::from_config(&config);
    let run_row = db.start_sync_run(&options.run_id).map_err(|e| e.to_string())?;

    // A fatal error leaves the run row without completed_at
    let report = run_sync(&client, &db, &options).map_err(|e| format!("Sync aborted: {}", e))?;

    if let Err(e) = db.complete_sync_run(run_row, &report) {
        tracing::warn!(error = %e, "could not record sync run");
    }

    if json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", out);
    } else {
        print_report(&report);
    }

    Ok(if report.is_success() { 0 } else { 2 })
}

fn print_report(report: &SyncReport) {
    let title = if report.is_success() {
        "Sync complete".green().bold()
    } else {
        "Sync finished with failures".yellow().bold()
    };
    println!("{} ({})", title, report.run_id.dimmed());
    println!("  Templates discovered: {}", report.templates_discovered);
    println!("  Templates created:    {}", report.templates_created);
    println!("  Templates existing:   {}", report.templates_existing);
    println!("  Mappings created:     {}", report.mappings_created);

    if !report.failures.is_empty() {
        println!("  {} {}", "Failures:".red(), report.failures.len());
        for f in &report.failures {
            let target = match &f.token {
                Some(token) => format!("{} ({})", f.key, token),
                None => f.key.clone(),
            };
            println!("    [{}] {}: {}", f.stage, target, f.message);
        }
    }
}

fn cmd_templates(json: bool) -> Result<(), String> {
    let db = open_db()?;
    let templates = db.get_all_templates().map_err(|e| e.to_string())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates).map_err(|e| e.to_string())?);
        return Ok(());
    }

    if templates.is_empty() {
        println!("No templates. Run 'template-sync sync' first.");
        return Ok(());
    }

    println!("ID     REMOTE ID                  LAST MODIFIED              NAME");
    for t in &templates {
        println!("{:<6} {:<26} {:<26} {}", t.id, t.remote_id, t.last_modified, t.name);
    }
    Ok(())
}

fn cmd_mappings(template_id: i32, all: bool, json: bool) -> Result<(), String> {
    let db = open_db()?;
    let template = db
        .get_template(template_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Template {} does not exist. Run 'template-sync templates' to see existing templates.", template_id))?;
    let mappings = db
        .get_field_mappings(template_id, all)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&mappings).map_err(|e| e.to_string())?);
        return Ok(());
    }

    println!("{} ({})", template.name.bold(), template.remote_id);
    if mappings.is_empty() {
        println!("  No field mappings.");
        return Ok(());
    }
    for m in &mappings {
        let local = m.local_field_name.as_deref().unwrap_or("-");
        let flag = if m.is_inactive { " (inactive)".dimmed().to_string() } else { String::new() };
        println!("  {:<6} {:<40} {}{}", m.id, m.remote_field_name, local, flag);
    }
    Ok(())
}

fn cmd_runs(limit: i64) -> Result<(), String> {
    let db = open_db()?;
    let runs = db.get_recent_runs(limit).map_err(|e| e.to_string())?;

    if runs.is_empty() {
        println!("No sync runs recorded.");
        return Ok(());
    }

    for r in &runs {
        let status = match (&r.completed_at, r.failure_count) {
            (None, _) => "aborted".red().to_string(),
            (Some(_), 0) => "ok".green().to_string(),
            (Some(_), n) => format!("{} failures", n).yellow().to_string(),
        };
        println!(
            "{:<5} {}  {}  templates {}/{} new  mappings {} new  [{}]",
            r.id,
            r.started_at,
            r.run_id.dimmed(),
            r.templates_created,
            r.templates_discovered,
            r.mappings_created,
            status
        );
    }
    Ok(())
}
