//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::terminal::{self, TerminalObserver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wrangle_core::config::{
    WrangleConfig, config_exists, load_config_with_file, workspace_config_path,
};
use wrangle_core::persistence::atomic_write;
use wrangle_core::{NoOpObserver, Pipeline, PipelineObserver, Table, WrangleError};

/// Global options shared by every subcommand.
pub struct Context {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
    pub quiet: bool,
}

impl Context {
    fn load_config(&self) -> anyhow::Result<WrangleConfig> {
        if self.config_file.is_none() && !config_exists(Some(&self.workspace)) {
            tracing::debug!("no configuration file found, using defaults and environment");
        }
        load_config_with_file(Some(&self.workspace), self.config_file.as_deref())
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    fn pipeline(&self, config: WrangleConfig, observer: Arc<dyn PipelineObserver>) -> Pipeline {
        Pipeline::with_kaggle(config, &self.workspace).with_observer(observer)
    }

    fn observer(&self) -> Arc<dyn PipelineObserver> {
        if self.quiet {
            Arc::new(NoOpObserver)
        } else {
            Arc::new(TerminalObserver)
        }
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Run => handle_run(ctx).await,
        Commands::Acquire { output } => handle_acquire(ctx, output).await,
        Commands::Sample {
            input,
            output,
            fraction,
            target,
            seed,
        } => {
            let mut config = ctx.load_config()?;
            if let Some(fraction) = fraction {
                config.sample.reduction_percent = fraction;
            }
            if let Some(target) = target {
                config.sample.target_variable = target;
            }
            if let Some(seed) = seed {
                config.sample.seed = seed;
            }
            config.validate()?;
            handle_sample(ctx, config, input, output).await
        }
        Commands::Diagnose { input, json } => handle_diagnose(ctx, input, json),
        Commands::Clean { input, output } => handle_clean(ctx, input, output),
        Commands::Config { action } => handle_config(action, ctx),
    }
}

async fn handle_run(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let pipeline = ctx.pipeline(config, ctx.observer());
    let report = pipeline.run().await?;
    if !ctx.quiet {
        println!("{}", terminal::render_summary(&report));
    }
    Ok(())
}

async fn handle_acquire(ctx: &Context, output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let target = output.unwrap_or_else(|| config.files.raw_full.clone());
    let pipeline = ctx.pipeline(config, ctx.observer());
    pipeline.download_raw(&target).await?;
    Ok(())
}

async fn handle_sample(
    ctx: &Context,
    config: WrangleConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| config.files.raw_full.clone());
    let output = output.unwrap_or_else(|| config.files.raw_short.clone());
    let sample = config.sample.clone();
    let pipeline = ctx.pipeline(config, ctx.observer());
    pipeline.create_raw_short(&input, &output, &sample).await?;
    Ok(())
}

fn handle_diagnose(ctx: &Context, input: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let input = input.unwrap_or_else(|| config.files.raw_short.clone());
    // JSON goes to stdout alone
    let observer: Arc<dyn PipelineObserver> = if json {
        Arc::new(NoOpObserver)
    } else {
        ctx.observer()
    };
    let pipeline = ctx.pipeline(config, observer);
    let diagnosis = pipeline.diagnose_missing_values(None, &input)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnosis.report)?);
    }
    Ok(())
}

fn handle_clean(
    ctx: &Context,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let input = input.unwrap_or_else(|| config.files.raw_short.clone());
    let output = output.unwrap_or_else(|| config.files.prepared.clone());
    let pipeline = ctx.pipeline(config, ctx.observer());

    let input = pipeline.resolve(&input);
    let table = load_table(&input)?;
    pipeline.handle_missing_values(&table, &output)?;
    Ok(())
}

fn load_table(path: &Path) -> Result<Table, WrangleError> {
    if !path.exists() {
        return Err(WrangleError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(Table::read_csv(path)?)
}

fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(&ctx.workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&WrangleConfig::default())?;
            atomic_write(&config_path, toml_str.as_bytes())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.load_config()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
