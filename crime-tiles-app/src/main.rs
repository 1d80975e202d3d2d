use anyhow::Context;
use clap::Parser;
use crime_tiles::{
    data::categories::{category_description, is_known_category, DEFAULT_CATEGORY},
    prelude::*,
    CrimeTilesConfig,
};
use std::path::PathBuf;
use std::result::Result;

/// Loads street-level crime for a map viewport through the tile cache
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Viewport as `min_lon,min_lat,max_lon,max_lat`
    #[arg(long, default_value = "-0.13,51.50,-0.12,51.51", value_parser = parse_bounds)]
    bounds: GeoBounds,

    /// Month to load (`YYYY-MM`); defaults to the latest published month
    #[arg(long)]
    date: Option<DateKey>,

    /// Crime category slug, repeatable
    #[arg(long = "category", default_value = DEFAULT_CATEGORY)]
    categories: Vec<String>,

    /// Directory holding cached tiles
    #[arg(long, default_value = ".crime-tiles")]
    cache_dir: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage quota in MiB used for purge decisions
    #[arg(long)]
    quota_mb: Option<u64>,
}

fn parse_bounds(value: &str) -> Result<GeoBounds, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("{part}: {e}")))
        .collect::<Result<_, _>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts[..] else {
        return Err("expected four comma-separated numbers".to_string());
    };
    let bounds = GeoBounds::new(min_lon, min_lat, max_lon, max_lat);
    if !bounds.is_valid() {
        return Err(format!("invalid bounds {value}"));
    }
    Ok(bounds)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crime_tiles::init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CrimeTilesConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CrimeTilesConfig::default(),
    };

    for category in &args.categories {
        if !is_known_category(category) {
            log::warn!("unknown category {}, the API may reject it", category);
        }
    }

    let store = FileStore::open(&args.cache_dir)
        .await
        .with_context(|| format!("opening cache at {}", args.cache_dir.display()))?;
    let quota: Option<Arc<dyn QuotaProvider>> = args
        .quota_mb
        .map(|mb| Arc::new(FixedQuota::new(mb * 1024 * 1024, 0)) as Arc<dyn QuotaProvider>);
    let cache = TileCache::open(Arc::new(store), quota, config.cache.clone()).await?;

    let source = Arc::new(PoliceApiSource::new(config.api_base_url.clone()));
    let fetcher = ViewportFetcher::new(config.fetcher.clone(), cache, source)?;

    let date_key = args
        .date
        .unwrap_or_else(|| DateKey::default_for(chrono::Local::now().date_naive()));
    let request = ViewportRequest::new(args.bounds, date_key, args.categories);

    let cycle = fetcher.request_viewport_data(request.clone(), |features| {
        log::info!("received {} crimes", features.len());
    });

    let summary = tokio::select! {
        summary = cycle.join() => summary.context("viewport task did not complete")?,
        _ = tokio::signal::ctrl_c() => {
            let aborted = fetcher.abort_all();
            log::warn!("interrupted, cancelled {} tile fetches", aborted);
            return Ok(());
        }
    };

    println!(
        "{} tile(s) for {}: {} cached, {} fetched, {} empty, {} failed, {} purged",
        summary.required,
        request.date_key,
        summary.served_from_cache,
        summary.fetched,
        summary.empty,
        summary.failed,
        summary.purged
    );

    for category in &request.categories {
        let features = fetcher.rendered_features_for(category);
        let resolved = features.iter().filter(|f| f.has_known_outcome()).count();
        println!(
            "  {:<28} {:>6} crimes, {:>6} with an outcome",
            category_description(category).unwrap_or(category.as_str()),
            features.len(),
            resolved
        );
    }

    Ok(())
}
