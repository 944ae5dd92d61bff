use anyhow::{Context, Result};

use wr_features::config::PipelineConfig;
use wr_features::ingest::DataCreator;
use wr_features::logging;
use wr_features::provider::{DirectorySource, NflverseClient, ProviderConfig, StatsSource};

fn main() -> Result<()> {
    let config = PipelineConfig::load()?;
    logging::init(&config.log_level)?;

    let source: Box<dyn StatsSource> = match &config.source_dir {
        Some(dir) => Box::new(DirectorySource::new(dir.clone(), config.source_format)),
        None => Box::new(
            NflverseClient::new(ProviderConfig {
                format: config.source_format,
                cache_dir: config.cache_dir.clone(),
            })
            .context("unable to open provider cache")?,
        ),
    };

    let creator = DataCreator::new(&config.years);
    let output = creator.run(source.as_ref())?;
    output.write(&config)?;

    println!("Ingest complete");
    println!(
        "Years: {}-{}",
        config.years.first().copied().unwrap_or_default(),
        config.years.last().copied().unwrap_or_default()
    );
    for line in output.summary_lines(&config.data_dir) {
        println!("{line}");
    }
    println!("Game-by-game: {}", config.game_by_game_path().display());

    Ok(())
}
