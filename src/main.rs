use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use clap::Parser;
use post_import::{
    Importer,
    config::{Config, StoreConfig},
    progress::{ImportPhase, ProgressReporter, create_reporter},
    record::{self, ImportRecord},
    store::{ContentStore, debug::DebugStore, sqlite::SqliteStore},
};
use tracing::error;

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "POST_IMPORT_CONFIG")]
    config: PathBuf,
    /// Leave posts whose title already exists untouched
    #[clap(long)]
    no_update: bool,
    /// Log what would be written without touching any store
    #[clap(long)]
    dry_run: bool,
    /// Record files (.yaml, .yml, .json, .toml)
    #[clap(required = true)]
    records: Vec<PathBuf>,
}

async fn import<S: ContentStore>(
    store: S,
    config: &Config,
    update_existing: bool,
    records: Vec<ImportRecord>,
    reporter: Arc<dyn ProgressReporter>,
) {
    let titles = records.iter().map(ImportRecord::title).collect::<Vec<_>>();
    let mut importer = Importer::new(store)
        .with_defaults(&config.default_overrides())
        .with_reporter(reporter.clone());

    reporter.set_phase(ImportPhase::Importing);
    let ids = importer.import_many(records, update_existing).await;

    for (index, (id, title)) in ids.iter().zip(titles).enumerate() {
        match id {
            Some(id) => println!("{index}\t{id}\t{title}"),
            None => println!("{index}\t-\t{title}"),
        }
    }
    importer.errors().report_to(reporter.as_ref());
    reporter.set_phase(ImportPhase::Completed);
}

async fn run(opts: Opts, reporter: Arc<dyn ProgressReporter>) -> anyhow::Result<()> {
    reporter.set_phase(ImportPhase::LoadingConfig);
    let config = tokio::fs::read_to_string(&opts.config)
        .await
        .with_context(|| "read config")?;
    let config: Config = serde_yaml::from_str(&config)
        .with_context(|| format!("parse config from {}", opts.config.display()))?;
    config.validate().map_err(|msg| anyhow!("{msg}"))?;

    reporter.set_phase(ImportPhase::LoadingRecords);
    let mut records = Vec::new();
    for path in &opts.records {
        let loaded = record::load_records(path)
            .await
            .with_context(|| format!("load records from {}", path.display()))?;
        records.extend(loaded);
    }

    let update_existing = config.update_existing && !opts.no_update;
    if opts.dry_run {
        reporter.log_info("dry run, the configured store is left untouched");
    }
    match (&config.store, opts.dry_run) {
        (StoreConfig::Debug, _) | (_, true) => {
            import(DebugStore::default(), &config, update_existing, records, reporter).await
        }
        (StoreConfig::Sqlite { url }, false) => {
            let store = SqliteStore::open(url, config.temp_dir())
                .await
                .with_context(|| format!("open store {url}"))?;
            import(store, &config, update_existing, records, reporter).await
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let reporter = create_reporter();
    if let Err(e) = run(opts, reporter.clone()).await {
        reporter.log_error(&format!("{e:#}"));
        reporter.set_phase(ImportPhase::Failed(e.to_string()));
        error!(?e, "critical error");
    }
    reporter.finish();
}
