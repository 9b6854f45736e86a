use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use routeforge_core::{Config, RestController};
use tracing_subscriber::EnvFilter;

/// Proactive route compiler and installer for an ONOS-style controller.
#[derive(Parser, Debug)]
#[command(name = "routeforge", version, about)]
struct Args {
    /// Command to run and exit (create_routes, delete_routes); omit for the
    /// interactive shell
    command: Option<String>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller base URL, e.g. http://127.0.0.1:8181/onos/v1
    #[arg(long)]
    controller: Option<String>,

    /// Basic-auth username
    #[arg(long)]
    username: Option<String>,

    /// Basic-auth password
    #[arg(long)]
    password: Option<String>,

    /// Routing backend: astar, dijkstra-cpu, or dijkstra-gpu
    #[arg(short, long)]
    backend: Option<String>,

    /// Path to the sidecar distance file
    #[arg(long)]
    sidecar: Option<PathBuf>,

    /// Rules per install batch
    #[arg(long)]
    batch_size: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;
    let client = RestController::from_config(&config).context("failed to build the HTTP client")?;

    match args.command.as_deref() {
        Some(command) => run_command(command, &client, &config)
            .with_context(|| format!("command {command} failed")),
        None => shell(&client, &config),
    }
}

fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(url) = &args.controller {
        config.controller_base_url = url.clone();
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if let Some(backend) = &args.backend {
        config.backend = backend.parse()?;
    }
    if let Some(sidecar) = &args.sidecar {
        config.sidecar_path = Some(sidecar.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config)
}

fn run_command(command: &str, client: &RestController, config: &Config) -> anyhow::Result<()> {
    match command {
        "create_routes" => {
            let report = routeforge_core::create_routes(client, config)?;
            println!(
                "{} rules via {} ({} created, {} unchanged, {} failed, {} unroutable pairs) in {:.2?}",
                report.nr_rules,
                report.backend,
                report.install.created,
                report.install.unchanged,
                report.install.failed,
                report.stats.no_path,
                report.elapsed,
            );
            Ok(())
        }
        "delete_routes" => {
            let report = routeforge_core::delete_routes(client, config)?;
            println!(
                "{} flows deleted, {} failed, {} foreign flows untouched",
                report.deleted, report.failed, report.foreign,
            );
            Ok(())
        }
        other => anyhow::bail!("unknown command {other:?} (try help)"),
    }
}

fn shell(client: &RestController, config: &Config) -> anyhow::Result<()> {
    println!("Type \"help\" to see a list of possible commands");
    let stdin = std::io::stdin();
    loop {
        print!("routeforge> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "" => {}
            "help" => {
                for command in ["create_routes", "delete_routes", "help", "exit"] {
                    println!("{command}");
                }
            }
            "exit" => return Ok(()),
            command @ ("create_routes" | "delete_routes") => {
                // Shell commands report errors and keep the session alive.
                if let Err(err) = run_command(command, client, config) {
                    eprintln!("{err:#}");
                }
            }
            other => println!("Command ({other}) not found."),
        }
    }
}
