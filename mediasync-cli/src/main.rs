use anyhow::Result;
use clap::Parser;
use mediasync_core::{ModelTarget, SyncReport, SyncRequest};
use mediasync_engine::hooks::HookRegistry;
use mediasync_engine::run_sync;

#[derive(Parser)]
#[command(name = "mediasync")]
#[command(about = "Migrate media files from the local media dir into remote storage")]
#[command(version)]
struct Cli {
    /// Application namespace containing the model
    app: String,

    /// Model name within the app
    #[arg(long, short)]
    model: String,

    /// File-bearing field to migrate
    #[arg(long, short)]
    field: String,

    /// Limit to these ids
    #[arg(long = "pk", value_name = "ID")]
    pk: Vec<i64>,

    /// Remove local files after migrate
    #[arg(long, short)]
    remove: bool,

    /// Don't persist records after updating the field
    #[arg(long, short = 's')]
    skip_save: bool,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    output: OutputFormat,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = ModelTarget::new(&cli.app, &cli.model, &cli.field);
    let request = SyncRequest {
        target,
        ids: cli.pk,
        remove: cli.remove,
        save: !cli.skip_save,
    };

    let report = run_sync(request, HookRegistry::new()).await?;
    print_report(&report, &cli.output)?;

    Ok(())
}

fn print_report(report: &SyncReport, output: &OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!(
                "✅ Synced {} file(s), skipped {} missing",
                report.migrated, report.skipped
            );
            if report.removed > 0 {
                println!("🗑️  Removed {} local file(s)", report.removed);
            }
        }
    }

    Ok(())
}
