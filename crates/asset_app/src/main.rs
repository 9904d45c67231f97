mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use asset_engine::{
    render_report, write_report, DirectoryProfileLoader, HarvestConfig, HarvestOptions,
    HarvestReport, Harvester, ProfileLoader, StaticProfileLoader,
};
use clap::Parser;
use harvest_logging::{harvest_info, LogDestination};
use log::LevelFilter;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = if args.log_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    harvest_logging::initialize(destination, level);

    let report = run(&args).await?;
    match &args.out {
        Some(dir) => {
            let summary = write_report(dir, &report, &args.sources)
                .with_context(|| format!("writing report to {}", dir.display()))?;
            println!("{}", summary.output_path.display());
        }
        None => println!("{}", render_report(&report)?),
    }
    Ok(())
}

async fn run(args: &CliArgs) -> Result<HarvestReport> {
    let config = HarvestConfig::load(args.config.as_deref()).context("loading configuration")?;
    let profiles: Arc<dyn ProfileLoader> = match &args.profiles {
        Some(dir) => Arc::new(DirectoryProfileLoader::new(dir.clone())),
        None => Arc::new(StaticProfileLoader::new()),
    };
    let harvester = Harvester::from_config(&config, profiles).context("building harvester")?;

    let options = HarvestOptions {
        labels: args.labels.clone(),
        verbose: args.verbose,
    };
    let report = harvester.harvest(&args.title, &args.sources, &options).await;
    harvest_info!(
        "{} candidates, {} warnings for `{}`",
        report.candidates.len(),
        report.warnings.len(),
        report.subject
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_without_sources_yields_an_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("harvest.ron");
        std::fs::write(
            &config,
            r#"(providers: [(name: "source_pages", weight: 0.85)], rate_limit_interval_ms: 0)"#,
        )
        .unwrap();
        let args = CliArgs::parse_from([
            "harvest",
            "Abyss",
            "--config",
            config.to_str().unwrap(),
        ]);

        let report = run(&args).await.unwrap();
        assert_eq!(report.subject, "Abyss");
        assert!(report.candidates.is_empty());

        let summary = write_report(dir.path(), &report, &args.sources).unwrap();
        assert!(summary.output_path.exists());
    }

    #[tokio::test]
    async fn unreadable_config_is_an_error() {
        let args = CliArgs::parse_from(["harvest", "Abyss", "--config", "/nonexistent/harvest.ron"]);
        assert!(run(&args).await.is_err());
    }
}
