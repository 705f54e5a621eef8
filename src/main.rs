use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use nem_puller::config::{api_key_from_env, Config};
use nem_puller::ingest::batch::{BatchFetcher, ThreadPacer};
use nem_puller::ingest::openelectricity::HttpMetricApi;
use nem_puller::logging::{self, DataSource, LogLevel};
use nem_puller::output::CsvMatrixWriter;
use nem_puller::periods;
use nem_puller::pipeline::{self, RunOptions};
use nem_puller::reference::ReferenceDataset;
use nem_puller::report;

/// Pull NEM facility metrics into monthly matrices.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, default_value = "puller.toml")]
    config: PathBuf,

    /// Overrides logging.level from the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Print the request periods and exit without calling the API.
    #[arg(long)]
    dry_run: bool,

    /// Also save the run summary as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level_name = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let level = LogLevel::parse(level_name)
        .ok_or_else(|| anyhow!("unknown log level '{}'", level_name))?;
    logging::init_logger(
        level,
        config.logging.file.clone(),
        config.logging.console_timestamps,
    )?;

    let periods = config.periods()?;
    logging::info(
        DataSource::System,
        None,
        &format!("Requested range: {}", periods::describe_range(&periods)),
    );
    for period in &periods {
        logging::info(DataSource::System, None, &period.to_string());
    }

    if cli.dry_run {
        logging::info(DataSource::System, None, "Dry run: no requests made");
        return Ok(());
    }

    let api_key = api_key_from_env()?;
    let api = HttpMetricApi::new(
        &config.api.base_url,
        &config.api.network,
        &api_key,
        config.api.timeout,
    )
    .context("building HTTP client")?;

    let reference = ReferenceDataset::load_or_empty(&config.reference.path);
    let mut fetcher = BatchFetcher::new(config.fetch_settings(), ThreadPacer);
    let options = RunOptions {
        facilities: config.facilities.clone(),
        region_filter: config.region_filter(),
        value_scale: config.value_scale,
        inter_period_delay: config.fetch.inter_period_delay,
        main_filename: config.output.main_filename.clone(),
        decommissioned_filename: config.output.decommissioned_filename.clone(),
    };
    let mut sink = CsvMatrixWriter::new(&config.output.dir);

    let run_report = pipeline::run(&api, &mut fetcher, &reference, &periods, &options, &mut sink)?;
    report::print_summary(&run_report);

    if let Some(path) = &cli.report {
        run_report
            .save_json(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(())
}
