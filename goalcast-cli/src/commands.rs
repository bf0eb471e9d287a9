//! CLI subcommand handlers.

use crate::Commands;
use dialoguer::{Input, Select};
use goalcast_core::bridge::server;
use goalcast_core::experiment::ModelKind;
use goalcast_core::tracking::TrackingStore;
use goalcast_core::{Isolation, MetricsBridge, MlflowClient, Settings};
use goalcast_ml::batch::{
    BatchCommand, BatchFilter, BatchReport, BatchRunner, ConfigSummary, InProcessWorker,
    SubprocessWorker, Worker, discover, group_by_model, plan,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Resolved workspace, settings and tracking store shared by every verb.
pub struct Context {
    pub workspace: PathBuf,
    /// Explicit `--settings` file, forwarded to child processes.
    pub settings_file: Option<PathBuf>,
    pub settings: Settings,
    pub store: Arc<dyn TrackingStore>,
}

impl Context {
    pub fn new(
        workspace: PathBuf,
        settings_file: Option<PathBuf>,
        settings: Settings,
    ) -> anyhow::Result<Self> {
        let client = MlflowClient::new(&settings.tracking)
            .map_err(|e| anyhow::anyhow!("Failed to build tracking client: {}", e))?;
        Ok(Self {
            workspace,
            settings_file,
            settings,
            store: Arc::new(client),
        })
    }

    fn configs_dir(&self) -> PathBuf {
        resolve(&self.workspace, &self.settings.batch.configs_dir)
    }

    /// Arguments that make a child `goalcast` resolve the same settings.
    fn child_args(&self) -> Vec<String> {
        let mut args = vec![
            "--workspace".to_string(),
            self.workspace.display().to_string(),
        ];
        if let Some(file) = &self.settings_file {
            args.push("--settings".to_string());
            args.push(file.display().to_string());
        }
        args
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::List => handle_batch(BatchCommand::List, ctx).await,
        Commands::RunAll => handle_batch(BatchCommand::RunAll, ctx).await,
        Commands::RunFiltered {
            pattern,
            model_type,
        } => {
            let filter = BatchFilter {
                pattern,
                model_type,
            };
            handle_batch(BatchCommand::RunFiltered(filter), ctx).await
        }
        Commands::Run { config, timeout_ms } => {
            handle_run(&config, timeout_ms.map(Duration::from_millis), ctx).await
        }
        Commands::Metrics => handle_metrics(ctx).await,
        Commands::ServeMetrics { bind } => handle_serve(bind, ctx).await,
        Commands::Menu => handle_menu(ctx).await,
        Commands::Settings => {
            print!("{}", ctx.settings.to_toml()?);
            Ok(())
        }
    }
}

async fn handle_batch(command: BatchCommand, ctx: &Context) -> anyhow::Result<()> {
    let dir = ctx.configs_dir();
    let summaries: Vec<ConfigSummary> = discover(&dir, &ctx.settings.batch.index_file)?
        .iter()
        .map(|p| ConfigSummary::read(p))
        .collect();

    if command == BatchCommand::List {
        print_listing(&dir, &summaries);
        return Ok(());
    }

    let selected = plan(&command, &summaries);
    if selected.is_empty() {
        println!("No configurations matched in {}.", dir.display());
        return Ok(());
    }
    println!("Running {} configuration(s)...", selected.len());

    let batch = &ctx.settings.batch;
    let report = match batch.isolation {
        Isolation::InProcess => {
            let worker =
                InProcessWorker::new(Arc::clone(&ctx.store)).with_timeout(batch.run_timeout());
            run_batch(worker, batch.pause(), &selected).await
        }
        Isolation::Subprocess => {
            let worker =
                SubprocessWorker::current_exe(ctx.child_args())?.with_timeout(batch.run_timeout());
            run_batch(worker, batch.pause(), &selected).await
        }
    };
    print_summary(&report, &ctx.store.location());
    Ok(())
}

async fn run_batch<W: Worker>(
    worker: W,
    pause: Duration,
    configs: &[PathBuf],
) -> BatchReport {
    BatchRunner::new(worker, pause).execute_all(configs).await
}

async fn handle_run(
    config: &Path,
    limit: Option<Duration>,
    ctx: &Context,
) -> anyhow::Result<()> {
    let run_id = goalcast_ml::execute_config_within(config, ctx.store.as_ref(), limit)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {}", config.display(), e))?;
    println!("{run_id}");
    Ok(())
}

async fn handle_metrics(ctx: &Context) -> anyhow::Result<()> {
    let bridge = MetricsBridge::new(Arc::clone(&ctx.store), ctx.settings.bridge.clone());
    let body = bridge.render().await?;
    if !body.is_empty() {
        println!("{body}");
    }
    Ok(())
}

async fn handle_serve(bind: Option<String>, ctx: &Context) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| ctx.settings.bridge.bind.clone());
    let bridge = Arc::new(MetricsBridge::new(
        Arc::clone(&ctx.store),
        ctx.settings.bridge.clone(),
    ));
    println!("Serving metrics on http://{bind}/metrics (Ctrl-C to stop)");
    tokio::select! {
        result = server::serve(bridge, &bind) => result?,
        _ = tokio::signal::ctrl_c() => println!("Shutting down."),
    }
    Ok(())
}

const MENU_ITEMS: [&str; 6] = [
    "List configurations",
    "Run all configurations",
    "Run one model type",
    "Run configurations matching a pattern",
    "Show metrics",
    "Exit",
];

async fn handle_menu(ctx: &Context) -> anyhow::Result<()> {
    loop {
        let selection = Select::new()
            .with_prompt("Goalcast")
            .items(&MENU_ITEMS)
            .default(0)
            .interact()?;

        let command = match selection {
            0 => BatchCommand::List,
            1 => BatchCommand::RunAll,
            2 => {
                let kinds: Vec<&str> = ModelKind::ALL.iter().map(|k| k.as_str()).collect();
                let kind = Select::new()
                    .with_prompt("Model type")
                    .items(&kinds)
                    .default(0)
                    .interact()?;
                BatchCommand::RunFiltered(BatchFilter {
                    pattern: None,
                    model_type: Some(kinds[kind].to_string()),
                })
            }
            3 => {
                let pattern: String = Input::new()
                    .with_prompt("Path pattern")
                    .interact_text()?;
                BatchCommand::RunFiltered(BatchFilter {
                    pattern: Some(pattern),
                    model_type: None,
                })
            }
            4 => {
                if let Err(e) = handle_metrics(ctx).await {
                    println!("Metrics unavailable: {}", e);
                }
                continue;
            }
            _ => return Ok(()),
        };

        if let Err(e) = handle_batch(command, ctx).await {
            println!("Error: {}", e);
        }
        println!();
    }
}

fn print_listing(dir: &Path, summaries: &[ConfigSummary]) {
    if summaries.is_empty() {
        println!("No configurations found in {}.", dir.display());
        return;
    }
    println!(
        "Configurations in {} ({}):",
        dir.display(),
        summaries.len()
    );
    for (model, members) in group_by_model(summaries) {
        println!();
        println!("  {} ({})", model, members.len());
        for s in members {
            let name = s
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| s.path.display().to_string());
            println!("    {:<32} run={} experiment={}", name, s.run_name, s.experiment_name);
        }
    }
}

fn print_summary(report: &BatchReport, tracking_uri: &str) {
    println!();
    println!("Batch summary");
    println!("  Total:     {}", report.total);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    if let Some(rate) = report.success_rate() {
        println!("  Success:   {:.1}%", rate);
    }
    for failure in report.failures() {
        let reason = failure.output.lines().last().unwrap_or("no output");
        println!("    - {}: {}", failure.config.display(), reason);
    }
    println!("  Tracking:  {}", tracking_uri);
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
