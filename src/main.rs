use std::process::ExitCode;

use realmscout::cli::{Cli, OutputFormat};
use realmscout::config::Config;
use realmscout::errors::{DiscoveryError, ErrorCategory};
use realmscout::facade::Discoverer;
use realmscout::netutil::validate_client_hostname;
use realmscout::structured_output::DiscoveryReport;
use realmscout::styled_output::StyledFormatter;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::from_args();
    init_logging(&cli);

    // Handle schema generation early exit
    if cli.generate_schema {
        return match DiscoveryReport::generate_json_schema() {
            Ok(schema) => {
                println!("{}", schema);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error generating JSON schema: {}", e);
                exit_code(ErrorCategory::Internal)
            }
        };
    }

    // Load configuration
    let mut config = Config::from_env();
    config.merge_with_cli(&cli);
    if let Err(e) = config.validate() {
        return fail(&cli, &e.into());
    }

    // An explicit hostname is checked before any resolver is set up.
    if let Some(hostname) = &cli.hostname
        && let Err(e) = validate_client_hostname(hostname.trim())
    {
        return fail(&cli, &e);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return fail(&cli, &DiscoveryError::internal(format!("runtime: {e}"))),
    };

    let report = match runtime.block_on(discover(&cli, config)) {
        Ok(report) => report,
        Err(e) => return fail(&cli, &e),
    };

    if let Err(e) = render(&cli, &report) {
        if cli.error_enabled() {
            eprintln!("Error writing output: {e:#}");
        }
        return exit_code(ErrorCategory::Internal);
    }
    ExitCode::SUCCESS
}

async fn discover(cli: &Cli, config: Config) -> realmscout::Result<DiscoveryReport> {
    let discoverer = Discoverer::from_config(config)?;
    let request = cli.discovery_request();
    debug!(?request, "starting discovery");
    discoverer.discover(&request).await
}

fn render(cli: &Cli, report: &DiscoveryReport) -> anyhow::Result<()> {
    match cli.output {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Yaml => print!("{}", report.to_yaml()?),
        OutputFormat::Text => {
            let formatter = if cli.no_color {
                StyledFormatter::without_colors()
            } else {
                StyledFormatter::new()
            };
            formatter.print_report(report)?;
        }
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.is_trace())
        .try_init();
}

fn fail(cli: &Cli, error: &DiscoveryError) -> ExitCode {
    if cli.error_enabled() {
        eprintln!("Error: {error}");
    }
    exit_code(error.category())
}

fn exit_code(category: ErrorCategory) -> ExitCode {
    ExitCode::from(category.exit_code() as u8)
}
