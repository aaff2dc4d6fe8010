use crate::demo::{run_demo, DemoArgs};
use crate::infra::{build_service, write_audit_export, ExportFormat};
use crate::server;
use clap::{Args, Parser, Subcommand};
use offer_engine::config::AppConfig;
use offer_engine::error::AppError;
use offer_engine::telemetry;
use offer_engine::workflows::offers::{AuditQuery, EntityType};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Offer Transaction Engine",
    about = "Run and operate the offer transaction engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect the append-only audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Expire overdue offers and retry due contract pushes once, then exit
    Sweep,
    /// Walk a listing from competing offers to an accepted contract in memory
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Export audit entries as CSV or JSON for compliance tooling
    Export(AuditExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct AuditExportArgs {
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub(crate) format: ExportFormat,
    /// Write to this file instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    #[arg(long)]
    pub(crate) actor: Option<String>,
    /// Action label, e.g. offer.accepted
    #[arg(long)]
    pub(crate) action: Option<String>,
    #[arg(long, value_parser = parse_entity_type)]
    pub(crate) entity_type: Option<EntityType>,
    #[arg(long)]
    pub(crate) entity_id: Option<String>,
}

impl AuditExportArgs {
    fn query(&self) -> AuditQuery {
        AuditQuery {
            actor_user_id: self.actor.clone(),
            action: self.action.clone(),
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
            ..AuditQuery::default()
        }
    }
}

fn parse_entity_type(raw: &str) -> Result<EntityType, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unknown entity type '{raw}'"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Audit {
            command: AuditCommand::Export(args),
        } => export_audit(args),
        Command::Sweep => sweep().await,
        Command::Demo(args) => run_demo(args).await,
    }
}

fn export_audit(args: AuditExportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = build_service(&config.storage, &config.integration)?;
    if !service.store().is_persistent() {
        return Err(AppError::Export(
            "OFFER_DATA_DIR must point at a record store to export from".to_string(),
        ));
    }

    let entries = service.query_audit(&args.query())?;
    match &args.output {
        Some(path) => {
            let file = BufWriter::new(File::create(path)?);
            write_audit_export(&entries, args.format, file)
        }
        None => write_audit_export(&entries, args.format, io::stdout().lock()),
    }
}

async fn sweep() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let service = build_service(&config.storage, &config.integration)?;
    let report = server::run_maintenance(&service).await?;
    println!(
        "Expired {} offer(s); retried {} push(es): {} confirmed, {} rescheduled, {} failed",
        report.expired.len(),
        report.pushes.attempted,
        report.pushes.confirmed,
        report.pushes.rescheduled,
        report.pushes.failed
    );
    Ok(())
}
