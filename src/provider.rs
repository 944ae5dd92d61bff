use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use tracing::info;

use crate::frame;
use crate::http_cache::FileCache;
use crate::schema::{self, TableSchema};
use crate::table_io;

const RELEASES: &str = "https://github.com/nflverse/nflverse-data/releases/download";
const SCHEDULES_URL: &str = "http://www.habitatring.com/games.csv";
const IDS_URL: &str = "https://raw.githubusercontent.com/dynastyprocess/data/master/files/db_playerids.csv";

/// Last season whose play-by-play release ships participation data.
pub const LAST_PARTICIPATION_SEASON: i32 = 2023;

/// Encoding of the release assets the source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Parquet,
    Csv,
}

impl SourceFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Parquet => "parquet",
            SourceFormat::Csv => "csv",
        }
    }

    pub fn read(self, path: &Path) -> Result<DataFrame> {
        match self {
            SourceFormat::Parquet => table_io::read_parquet(path),
            SourceFormat::Csv => table_io::read_csv(path),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parquet" | "pq" => Ok(SourceFormat::Parquet),
            "csv" => Ok(SourceFormat::Csv),
            other => Err(anyhow!("unknown source format `{other}` (expected parquet or csv)")),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NgsStat {
    Receiving,
    Rushing,
    Passing,
}

impl NgsStat {
    fn as_str(self) -> &'static str {
        match self {
            NgsStat::Receiving => "receiving",
            NgsStat::Rushing => "rushing",
            NgsStat::Passing => "passing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfrStat {
    Rec,
    Rush,
    Pass,
}

impl PfrStat {
    fn as_str(self) -> &'static str {
        match self {
            PfrStat::Rec => "rec",
            PfrStat::Rush => "rush",
            PfrStat::Pass => "pass",
        }
    }
}

/// Where a dataset lives within a release, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Ids,
    Schedules,
    WeeklyRosters(i32),
    DepthCharts(i32),
    PlayByPlay(i32),
    Participation(i32),
    Ngs(NgsStat),
    Pfr(PfrStat, i32),
    Injuries(i32),
}

impl Asset {
    /// File stem shared by the release URL and a local mirror.
    pub fn stem(&self) -> String {
        match self {
            Asset::Ids => "db_playerids".to_string(),
            Asset::Schedules => "games".to_string(),
            Asset::WeeklyRosters(year) => format!("roster_weekly_{year}"),
            Asset::DepthCharts(year) => format!("depth_charts_{year}"),
            Asset::PlayByPlay(year) => format!("play_by_play_{year}"),
            Asset::Participation(year) => format!("pbp_participation_{year}"),
            Asset::Ngs(stat) => format!("ngs_{}", stat.as_str()),
            Asset::Pfr(stat, year) => format!("advstats_week_{}_{year}", stat.as_str()),
            Asset::Injuries(year) => format!("injuries_{year}"),
        }
    }

    fn release(&self) -> Option<&'static str> {
        match self {
            Asset::Ids | Asset::Schedules => None,
            Asset::WeeklyRosters(_) => Some("weekly_rosters"),
            Asset::DepthCharts(_) => Some("depth_charts"),
            Asset::PlayByPlay(_) => Some("pbp"),
            Asset::Participation(_) => Some("pbp_participation"),
            Asset::Ngs(_) => Some("nextgen_stats"),
            Asset::Pfr(..) => Some("pfr_advstats"),
            Asset::Injuries(_) => Some("injuries"),
        }
    }

    /// The two third-party CSVs ignore the configured format.
    pub fn format(&self, configured: SourceFormat) -> SourceFormat {
        match self {
            Asset::Ids | Asset::Schedules => SourceFormat::Csv,
            _ => configured,
        }
    }

    pub fn url(&self, configured: SourceFormat) -> String {
        match self {
            Asset::Ids => IDS_URL.to_string(),
            Asset::Schedules => SCHEDULES_URL.to_string(),
            _ => format!(
                "{RELEASES}/{}/{}.{}",
                self.release().unwrap_or_default(),
                self.stem(),
                self.format(configured).extension()
            ),
        }
    }
}

/// The tabular sports-statistics provider. Every method returns a frame
/// already checked against its schema.
pub trait StatsSource {
    fn fetch(&self, asset: &Asset) -> Result<DataFrame>;

    fn import_ids(&self) -> Result<DataFrame> {
        let mut ids = self.fetch(&Asset::Ids)?;
        conform(&schema::PLAYER_IDS, &mut ids)?;
        Ok(ids)
    }

    fn import_schedules(&self, years: &[i32]) -> Result<DataFrame> {
        let games = self.fetch(&Asset::Schedules)?;
        schema::SCHEDULES.validate(&games)?;
        filter_seasons(&games, years)
    }

    fn import_weekly_rosters(&self, year: i32) -> Result<DataFrame> {
        let mut roster = self.fetch(&Asset::WeeklyRosters(year))?;
        conform(&schema::WEEKLY_ROSTERS, &mut roster)?;
        Ok(roster)
    }

    fn import_depth_charts(&self, years: &[i32]) -> Result<DataFrame> {
        per_year(years, &schema::DEPTH_CHARTS, |year| self.fetch(&Asset::DepthCharts(year)))
    }

    /// Play-by-play for each year. Participation columns are merged in
    /// where requested and published; elsewhere they are present but null.
    fn import_pbp(&self, years: &[i32], include_participation: bool) -> Result<DataFrame> {
        let mut parts = Vec::with_capacity(years.len());
        for &year in years {
            let mut pbp = self.fetch(&Asset::PlayByPlay(year))?;
            schema::PLAY_BY_PLAY.validate(&pbp)?;
            if include_participation && year <= LAST_PARTICIPATION_SEASON {
                let participation = self.fetch(&Asset::Participation(year))?;
                pbp = merge_participation(&pbp, &participation)?;
            }
            for col in schema::PARTICIPATION_COLUMNS {
                frame::ensure_column(&mut pbp, col, &DataType::String)?;
            }
            info!(year, plays = pbp.height(), "play-by-play loaded");
            parts.push(pbp);
        }
        Ok(frame::concat(parts)?)
    }

    fn import_ngs(&self, stat: NgsStat, years: &[i32]) -> Result<DataFrame> {
        let mut ngs = self.fetch(&Asset::Ngs(stat))?;
        if stat == NgsStat::Receiving {
            conform(&schema::NGS_RECEIVING, &mut ngs)?;
        }
        let ngs = filter_seasons(&ngs, years)?;
        Ok(frame::dedup(&ngs)?)
    }

    fn import_weekly_pfr(&self, stat: PfrStat, years: &[i32]) -> Result<DataFrame> {
        let pfr = if stat == PfrStat::Rec {
            per_year(years, &schema::PFR_RECEIVING, |year| self.fetch(&Asset::Pfr(stat, year)))?
        } else {
            frame::concat(
                years
                    .iter()
                    .map(|&year| self.fetch(&Asset::Pfr(stat, year)))
                    .collect::<Result<Vec<_>>>()?,
            )?
        };
        Ok(frame::dedup(&pfr)?)
    }

    fn import_injuries(&self, years: &[i32]) -> Result<DataFrame> {
        per_year(years, &schema::INJURIES, |year| self.fetch(&Asset::Injuries(year)))
    }
}

fn conform(schema: &TableSchema, df: &mut DataFrame) -> Result<()> {
    schema.conform(df)?;
    Ok(())
}

fn per_year(
    years: &[i32],
    schema: &TableSchema,
    mut load: impl FnMut(i32) -> Result<DataFrame>,
) -> Result<DataFrame> {
    let mut parts = Vec::with_capacity(years.len());
    for &year in years {
        let mut part = load(year)?;
        schema
            .conform(&mut part)
            .with_context(|| format!("{} for {year}", schema.name))?;
        parts.push(part);
    }
    Ok(frame::concat(parts)?)
}

fn filter_seasons(df: &DataFrame, years: &[i32]) -> Result<DataFrame> {
    frame::require(df, "season")?;
    let wanted = years.iter().fold(lit(false), |acc, &year| {
        acc.or(col("season").cast(DataType::Int64).eq(lit(year as i64)))
    });
    Ok(df.clone().lazy().filter(wanted).collect()?)
}

fn merge_participation(pbp: &DataFrame, participation: &DataFrame) -> Result<DataFrame> {
    let mut keep = vec!["nflverse_game_id", "play_id"];
    keep.extend(
        schema::PARTICIPATION_COLUMNS
            .iter()
            .copied()
            .filter(|col| frame::has(participation, col)),
    );
    let slim = participation.select(keep)?;
    Ok(frame::join(
        pbp,
        &slim,
        &["game_id", "play_id"],
        &["nflverse_game_id", "play_id"],
        JoinType::Left,
    )?)
}

/// Reads release assets over HTTP through the on-disk cache.
#[derive(Debug)]
pub struct NflverseClient {
    format: SourceFormat,
    cache: FileCache,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub format: SourceFormat,
    pub cache_dir: Option<PathBuf>,
}

impl NflverseClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            format: config.format,
            cache: FileCache::open(config.cache_dir)?,
        })
    }
}

impl StatsSource for NflverseClient {
    fn fetch(&self, asset: &Asset) -> Result<DataFrame> {
        let url = asset.url(self.format);
        let path = self.cache.fetch(&url)?;
        asset
            .format(self.format)
            .read(&path)
            .with_context(|| format!("decode {url}"))
    }
}

/// Reads the same assets from a local directory of `{stem}.{ext}` files.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    format: SourceFormat,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }
}

impl StatsSource for DirectorySource {
    fn fetch(&self, asset: &Asset) -> Result<DataFrame> {
        let format = asset.format(self.format);
        let path = self
            .root
            .join(format!("{}.{}", asset.stem(), format.extension()));
        format
            .read(&path)
            .with_context(|| format!("read {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_release_layout() {
        assert_eq!(
            Asset::PlayByPlay(2023).url(SourceFormat::Parquet),
            "https://github.com/nflverse/nflverse-data/releases/download/pbp/play_by_play_2023.parquet"
        );
        assert_eq!(
            Asset::Pfr(PfrStat::Rec, 2022).url(SourceFormat::Csv),
            "https://github.com/nflverse/nflverse-data/releases/download/pfr_advstats/advstats_week_rec_2022.csv"
        );
        assert_eq!(Asset::Schedules.url(SourceFormat::Parquet), SCHEDULES_URL);
    }

    #[test]
    fn participation_joins_on_play_keys() {
        let pbp = df!(
            "game_id" => ["g1", "g1", "g2"],
            "play_id" => [1i64, 2, 1],
        )
        .unwrap();
        let participation = df!(
            "nflverse_game_id" => ["g1", "g2"],
            "play_id" => [2i64, 1],
            "offense_players" => ["a;b", "c"],
        )
        .unwrap();
        let merged = merge_participation(&pbp, &participation).unwrap();
        assert_eq!(merged.height(), 3);
        assert!(!frame::has(&merged, "nflverse_game_id"));
        assert_eq!(
            frame::texts(&merged, "offense_players").unwrap(),
            vec![None, Some("a;b".to_string()), Some("c".to_string())]
        );
    }

    #[test]
    fn seasons_outside_the_request_are_dropped() {
        let games = df!("season" => [2019i64, 2020, 2021]).unwrap();
        let kept = filter_seasons(&games, &[2019, 2021]).unwrap();
        assert_eq!(frame::ints(&kept, "season").unwrap(), vec![Some(2019), Some(2021)]);
    }

    #[test]
    fn format_parses() {
        assert_eq!("CSV".parse::<SourceFormat>().unwrap(), SourceFormat::Csv);
        assert!("feather".parse::<SourceFormat>().is_err());
    }
}
