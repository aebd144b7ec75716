use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ncbi_query::config::{ConfigLoader, QueryOverrides, env_api_key};
use ncbi_query::controller::QueryController;
use ncbi_query::ncbi::EutilsHttpClient;
use ncbi_query::output::JsonOutput;

const USAGE: &str = "usage:\n\tncbi-query <species name> [marker] [api key]\n\n\
Use double quotes if the species name includes spaces, as in \"Munna minuta\". \
The marker/gene name (COI by default) and the NCBI API key can be omitted.";

#[derive(Parser)]
#[command(name = "ncbi-query")]
#[command(about = "Fetch every GenBank nucleotide record for an organism and marker gene")]
#[command(version, author)]
struct Cli {
    /// Organism name, e.g. "Munna minuta".
    organism: Option<String>,

    /// Single-token marker/gene name.
    marker: Option<String>,

    /// NCBI API key (falls back to NCBI_API_KEY).
    api_key: Option<String>,

    /// Identifiers requested per search page.
    #[arg(long)]
    page_size: Option<u64>,

    /// Offset of the first search page.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// JSON config file (defaults to ./ncbi-query.json, then the user config directory).
    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    // Run-time failures are reported on stderr; the exit status stays zero.
    if let Err(report) = run() {
        eprintln!("{report:?}");
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.as_deref())?;
    let overrides = QueryOverrides {
        organism: cli.organism,
        marker: cli.marker,
        page_size: cli.page_size,
        api_key: cli.api_key.or_else(env_api_key),
    };

    let Some(resolved) = ConfigLoader::resolve_config(config, overrides)? else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let client = EutilsHttpClient::new(resolved.endpoint.timeout)?;
    let mut controller = QueryController::new(client, resolved.query, resolved.endpoint);

    let summary = runtime.block_on(async {
        tokio::select! {
            summary = controller.run(cli.start, &JsonOutput) => Some(summary),
            _ = tokio::signal::ctrl_c() => None,
        }
    });

    match summary {
        Some(summary) => JsonOutput::print_summary(&summary)?,
        None => {
            warn!("interrupted, abandoning query");
            JsonOutput::print_summary(&controller.summary())?;
        }
    }
    Ok(())
}
