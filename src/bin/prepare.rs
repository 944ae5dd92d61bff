use anyhow::{Context, Result};

use wr_features::config::PipelineConfig;
use wr_features::logging;
use wr_features::prepare::{self, PrepData, RawInputs};

fn main() -> Result<()> {
    let config = PipelineConfig::load()?;
    logging::init(&config.log_level)?;

    let inputs = RawInputs::read(&config.data_dir, &config.files)
        .context("unable to read ingested tables; run `ingest` first")?;
    let prep = PrepData::from_config(&config);
    let (windowed, report) = prep.run(&inputs)?;
    prepare::write_windowed(&windowed, &config)?;

    println!("Prepare complete");
    println!("Output: {}", config.data_path(&config.windowed_output).display());
    println!("Window: {} | Top N: {} | Position: {}", config.window, config.top_n, config.position);
    println!("Cleaned rows: {}", report.cleaned_rows);
    println!("Top-N rows: {}", report.top_n_rows);
    println!("Windowed rows: {}", report.windowed_rows);
    println!(
        "Imputed: {} (left missing: {})",
        report.imputed.filled(),
        report.imputed.remaining_total()
    );
    println!(
        "QB history fills: season={} career={} league={} unfilled={}",
        report.qb_fill.season, report.qb_fill.career, report.qb_fill.league_season, report.qb_fill.unfilled
    );

    Ok(())
}
