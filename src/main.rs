//! keyspace-report: memory utilization report for Redis keyspaces.
//!
//! Scans the store once per report name, caches the aggregated keyspace
//! tree on disk, and prints one summary row per key prefix at the requested
//! depth.

use clap::Parser;
use tracing::info;

use keyspace_report::config::{Cli, Config, OutputFormat};
use keyspace_report::pipeline::{Outcome, PipelineOptions, ReportPipeline};
use keyspace_report::report::{derive_levels, ReportBuilder, ReportRenderer};

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging. stdout is reserved for the report.
    let filter = if cli.verbose {
        "keyspace_report=debug"
    } else {
        "keyspace_report=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("keyspace-report v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);

    let prefix = cli.prefix.as_deref();
    let levels = derive_levels(
        cli.level,
        prefix,
        config.report.default_levels,
        config.report.delimiter,
    );

    info!(
        name = %cli.name,
        levels,
        prefix = prefix.unwrap_or(""),
        snapshot_dir = %config.snapshot.dir.display(),
        "Configuration loaded"
    );

    let pipeline = ReportPipeline::from_config(&config);
    let options = PipelineOptions {
        regenerate: cli.regenerate,
        verify_keyspace: config.snapshot.verify_keyspace,
    };
    let outcome = run_pipeline(&pipeline, &config, &cli.name, options)?;

    // Flatten and render.
    let rows = ReportBuilder::new(config.report.delimiter).flatten(&outcome.root, levels)?;
    let renderer = ReportRenderer::new(config.report.key_width);

    match cli.format {
        OutputFormat::Table => print!("{}", renderer.render(&rows, prefix)),
        OutputFormat::Json => println!("{}", renderer.render_json(&rows, prefix)?),
    }

    let summary = renderer.summarize(&rows, prefix);
    info!(
        rows = summary.rows,
        keys = summary.leaf_count,
        size_kb = summary.size_kb,
        source = ?outcome.source,
        snapshot_created = %outcome.meta.created_at,
        "Report complete"
    );

    Ok(())
}

#[cfg(feature = "redis-backend")]
fn run_pipeline(
    pipeline: &ReportPipeline,
    config: &Config,
    name: &str,
    options: PipelineOptions,
) -> anyhow::Result<Outcome> {
    let mut store = keyspace_report::store::LazyRedisStore::new(config.store.clone());
    Ok(pipeline.load_or_build(&mut store, name, options)?)
}

#[cfg(not(feature = "redis-backend"))]
fn run_pipeline(
    pipeline: &ReportPipeline,
    _config: &Config,
    name: &str,
    options: PipelineOptions,
) -> anyhow::Result<Outcome> {
    // Without a store backend only existing snapshots can be reported.
    if options.regenerate {
        anyhow::bail!("--regenerate needs a store backend (build with feature `redis-backend`)");
    }
    match pipeline.cache().load(name)? {
        Some(snapshot) => Ok(Outcome {
            root: snapshot.root,
            meta: snapshot.meta,
            source: keyspace_report::pipeline::Source::Cached,
        }),
        None => anyhow::bail!(
            "no snapshot named {name:?} and no store backend compiled in (feature `redis-backend`)"
        ),
    }
}
