use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

use crate::provider::SourceFormat;

const ENV_PREFIX: &str = "WRF_";

#[derive(Debug, Clone, PartialEq)]
pub struct DataFiles {
    pub receiving: String,
    pub def_points: String,
    pub def_injuries: String,
    pub qb_stats: String,
    pub rosters: String,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            receiving: "agg_wr_final.csv".to_string(),
            def_points: "def_fpoints.csv".to_string(),
            def_injuries: "inj_defense.csv".to_string(),
            qb_stats: "qb_stats.csv".to_string(),
            rosters: "rosters.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub files: DataFiles,
    pub game_by_game: String,
    pub windowed_output: String,
    pub years: Vec<i32>,
    pub window: usize,
    pub top_n: usize,
    pub position: String,
    pub source_format: SourceFormat,
    /// Read provider assets from this directory instead of downloading them.
    pub source_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            files: DataFiles::default(),
            game_by_game: "final_gbg_rr.csv".to_string(),
            windowed_output: "windowed_wr.csv".to_string(),
            years: (2015..=2024).collect(),
            window: 2,
            top_n: 40,
            position: "WR".to_string(),
            source_format: SourceFormat::Parquet,
            source_dir: None,
            cache_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then `.env.local`/`.env`, then `WRF_*` variables, then CLI flags.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        Self::from_sources(|key| std::env::var(key).ok(), &args)
    }

    pub fn from_sources(env: impl Fn(&str) -> Option<String>, args: &[String]) -> Result<Self> {
        let mut cfg = Self::default();
        for key in SETTINGS {
            let env_key = format!("{ENV_PREFIX}{}", key.to_uppercase().replace('-', "_"));
            if let Some(raw) = env(&env_key).filter(|v| !v.trim().is_empty()) {
                cfg.apply(key, raw.trim())
                    .with_context(|| format!("invalid {env_key}"))?;
            }
        }
        for key in SETTINGS {
            if let Some(raw) = flag_value(args, key) {
                cfg.apply(key, raw.trim())
                    .with_context(|| format!("invalid --{key}"))?;
            }
        }
        Ok(cfg)
    }

    fn apply(&mut self, key: &str, raw: &str) -> Result<()> {
        match key {
            "data-dir" => self.data_dir = PathBuf::from(raw),
            "receiving-file" => self.files.receiving = raw.to_string(),
            "def-points-file" => self.files.def_points = raw.to_string(),
            "def-injuries-file" => self.files.def_injuries = raw.to_string(),
            "qb-stats-file" => self.files.qb_stats = raw.to_string(),
            "rosters-file" => self.files.rosters = raw.to_string(),
            "game-by-game" => self.game_by_game = raw.to_string(),
            "windowed" => self.windowed_output = raw.to_string(),
            "years" => self.years = parse_years(raw)?,
            "window" => self.window = parse_positive(raw)?,
            "top-n" => self.top_n = parse_positive(raw)?,
            "position" => self.position = raw.to_uppercase(),
            "source-format" => self.source_format = SourceFormat::from_str(raw)?,
            "source-dir" => self.source_dir = Some(PathBuf::from(raw)),
            "cache-dir" => self.cache_dir = Some(PathBuf::from(raw)),
            "log-level" => self.log_level = raw.to_string(),
            other => return Err(anyhow!("unknown setting {other}")),
        }
        Ok(())
    }

    pub fn data_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn game_by_game_path(&self) -> PathBuf {
        self.data_path(&self.game_by_game)
    }
}

const SETTINGS: &[&str] = &[
    "data-dir",
    "receiving-file",
    "def-points-file",
    "def-injuries-file",
    "qb-stats-file",
    "rosters-file",
    "game-by-game",
    "windowed",
    "years",
    "window",
    "top-n",
    "position",
    "source-format",
    "source-dir",
    "cache-dir",
    "log-level",
];

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let long = format!("--{name}");
    let prefix = format!("--{name}=");
    let mut found = None;
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            if !value.trim().is_empty() {
                found = Some(value);
            }
            continue;
        }
        if *arg == long
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            found = Some(next.as_str());
        }
    }
    found
}

/// Accepts `2019`, `2019-2021` and comma/space separated mixes of both.
pub fn parse_years(raw: &str) -> Result<Vec<i32>> {
    let mut years = Vec::new();
    for part in raw.split([',', ';', ' ']).filter(|p| !p.trim().is_empty()) {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: i32 = start.trim().parse().with_context(|| format!("bad year `{start}`"))?;
            let end: i32 = end.trim().parse().with_context(|| format!("bad year `{end}`"))?;
            if end < start {
                return Err(anyhow!("year range {part} runs backwards"));
            }
            years.extend(start..=end);
        } else {
            years.push(part.parse().with_context(|| format!("bad year `{part}`"))?);
        }
    }
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err(anyhow!("no years given"));
    }
    Ok(years)
}

fn parse_positive(raw: &str) -> Result<usize> {
    let value: usize = raw.parse().with_context(|| format!("not a number: `{raw}`"))?;
    if value == 0 {
        return Err(anyhow!("must be at least 1"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_override_env() {
        let env: HashMap<&str, &str> = [("WRF_WINDOW", "3"), ("WRF_TOP_N", "25")].into();
        let cfg = PipelineConfig::from_sources(
            |key| env.get(key).map(|v| v.to_string()),
            &args(&["--top-n", "10", "--years=2022-2023", "--source-format", "csv"]),
        )
        .unwrap();
        assert_eq!(cfg.window, 3);
        assert_eq!(cfg.top_n, 10);
        assert_eq!(cfg.years, vec![2022, 2023]);
        assert_eq!(cfg.source_format, SourceFormat::Csv);
    }

    #[test]
    fn rejects_zero_window() {
        let err = PipelineConfig::from_sources(|_| None, &args(&["--window=0"])).unwrap_err();
        assert!(format!("{err:#}").contains("--window"));
    }

    #[test]
    fn years_accept_lists_and_ranges() {
        assert_eq!(parse_years("2024, 2015-2016").unwrap(), vec![2015, 2016, 2024]);
        assert!(parse_years("2020-2019").is_err());
    }
}
