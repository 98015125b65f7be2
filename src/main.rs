//! Binary entry point for the volport CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use volport::config::ConfigError;
use volport::{
    AwsBackend, AwsBackendError, AwsSettings, CreateVolumeRequest, MkfsVolumeBuilder,
    ProcessCommandRunner, SizeError, VolportConfig, VolumeError, VolumeOrchestrator, VolumeRecord,
    VolumeSize, report,
};

mod cli;

use cli::{AttachmentCommand, Cli, CreateCommand, ListCommand};

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "VOLPORT_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

type Orchestrator = VolumeOrchestrator<AwsBackend, MkfsVolumeBuilder<ProcessCommandRunner>>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] AwsBackendError),
    #[error("invalid --size: {0}")]
    Size(#[from] SizeError),
    #[error(transparent)]
    Volume(Box<VolumeError<AwsBackendError>>),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<VolumeError<AwsBackendError>> for CliError {
    fn from(value: VolumeError<AwsBackendError>) -> Self {
        Self::Volume(Box::new(value))
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Create(args) => exec_create(args).await,
        Cli::List(args) => exec_list(&args).await,
        Cli::Delete(args) => {
            orchestrator()?.delete_volume(&args.volume_id).await?;
            writeln!(io::stdout(), "deleted {}", args.volume_id.trim())?;
            Ok(())
        }
        Cli::Attach(args) => exec_attachment(&args, true).await,
        Cli::Detach(args) => exec_attachment(&args, false).await,
    }
}

fn orchestrator() -> Result<Orchestrator, CliError> {
    let config = VolportConfig::load_without_cli_args()?;
    let settings = config.workflow_settings()?;
    let backend = AwsBackend::new(AwsSettings::from(&config))?;
    let builder = MkfsVolumeBuilder::new(
        config.mkfs_bin.trim(),
        config.volumes_dir(),
        ProcessCommandRunner,
    );
    Ok(VolumeOrchestrator::new(backend, builder, settings))
}

fn create_request(args: CreateCommand) -> Result<CreateVolumeRequest, CliError> {
    let size = args
        .size
        .as_deref()
        .map(str::parse::<VolumeSize>)
        .transpose()?;
    Ok(CreateVolumeRequest {
        name: args.name,
        data: args.data.map(Utf8PathBuf::from),
        size,
        provider: args.provider,
        tags: args.tags,
    })
}

async fn exec_create(args: CreateCommand) -> Result<(), CliError> {
    let request = create_request(args)?;
    let orchestrator = orchestrator()?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling import wait");
            trigger.cancel();
        }
    });
    let result = orchestrator.create_volume(&request, &cancel).await;
    watcher.abort();

    let record = result?;
    debug!(local_path = ?record.local_path, "volume created");
    write_created(&mut io::stdout(), &record)?;
    Ok(())
}

fn write_created(out: &mut impl Write, record: &VolumeRecord) -> io::Result<()> {
    writeln!(out, "{}", record.id.as_deref().unwrap_or_default())
}

async fn exec_list(args: &ListCommand) -> Result<(), CliError> {
    let volumes = orchestrator()?.list_volumes().await?;
    let mut stdout = io::stdout();
    if args.json {
        report::write_json(&mut stdout, &volumes)?;
    } else {
        report::write_table(&mut stdout, &volumes)?;
    }
    Ok(())
}

async fn exec_attachment(args: &AttachmentCommand, attach: bool) -> Result<(), CliError> {
    let orchestrator = orchestrator()?;
    let device = orchestrator.settings().slot.clone();
    if attach {
        orchestrator
            .attach_volume(&args.instance_id, &args.volume_id)
            .await?;
        writeln!(
            io::stdout(),
            "attached {} to {} at {device}",
            args.volume_id.trim(),
            args.instance_id.trim()
        )?;
    } else {
        orchestrator
            .detach_volume(&args.instance_id, &args.volume_id)
            .await?;
        writeln!(
            io::stdout(),
            "detached {} from {}",
            args.volume_id.trim(),
            args.instance_id.trim()
        )?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
