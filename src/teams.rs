use std::collections::HashMap;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use polars::prelude::*;

use crate::frame;

/// Legacy and provider-specific abbreviations mapped to current club codes.
pub const COMMON_CLUB_CODES: &[(&str, &str)] = &[
    ("LVR", "LV"),
    ("KCC", "KC"),
    ("NOS", "NO"),
    ("TBB", "TB"),
    ("SFO", "SF"),
    ("NEP", "NE"),
    ("GBP", "GB"),
    ("JAC", "JAX"),
    ("OAK", "LV"),
    ("STL", "LAR"),
    ("SL", "LAR"),
    ("SD", "LAC"),
    ("SDC", "LAC"),
    ("RAM", "LAR"),
    ("LA", "LAR"),
    ("BLT", "BAL"),
    ("HST", "HOU"),
    ("CLV", "CLE"),
    ("ARZ", "ARI"),
];

#[derive(Debug, Clone)]
pub struct TeamCodeMap {
    map: HashMap<String, String>,
}

impl TeamCodeMap {
    /// Builds the map with every chain resolved to its final code, so that
    /// `canonical` never returns a key of the map. Cycles are rejected.
    pub fn new(pairs: &[(&str, &str)]) -> Result<Self> {
        let raw: HashMap<&str, &str> = pairs.iter().copied().collect();
        let mut map = HashMap::with_capacity(raw.len());
        for &from in raw.keys() {
            let mut current = from;
            let mut hops = 0;
            while let Some(&next) = raw.get(current) {
                if next == current {
                    break;
                }
                current = next;
                hops += 1;
                if hops > raw.len() {
                    return Err(anyhow!("team code mapping has a cycle through {from}"));
                }
            }
            if current != from {
                map.insert(from.to_string(), current.to_string());
            }
        }
        Ok(Self { map })
    }

    pub fn common() -> Self {
        COMMON.clone()
    }

    pub fn canonical<'a>(&'a self, code: &'a str) -> &'a str {
        self.map.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn is_alias(&self, code: &str) -> bool {
        self.map.contains_key(code)
    }

    fn canonical_composite(&self, raw: &str, sep: char) -> String {
        let mut buf = [0u8; 4];
        let sep_str: &str = sep.encode_utf8(&mut buf);
        let tokens: Vec<&str> = raw.split(sep).map(|token| self.canonical(token)).collect();
        tokens.join(sep_str)
    }

    fn map_codes(
        &self,
        df: &mut DataFrame,
        column: &str,
        f: impl Fn(&str) -> String,
    ) -> Result<()> {
        let mapped: Vec<Option<String>> = frame::texts(df, column)?
            .into_iter()
            .map(|v| v.map(|code| f(&code)))
            .collect();
        df.with_column(Series::new(column.into(), mapped))?;
        Ok(())
    }

    pub fn normalize_column(&self, df: &mut DataFrame, column: &str) -> Result<()> {
        self.map_codes(df, column, |code| self.canonical(code).to_string())
    }

    /// Replaces codes appearing as `sep`-separated tokens, e.g. `2019_01_OAK_DEN`.
    pub fn normalize_composite_column(&self, df: &mut DataFrame, column: &str, sep: char) -> Result<()> {
        self.map_codes(df, column, |raw| self.canonical_composite(raw, sep))
    }

    /// Normalizes whichever of the named columns the frame has. Composite
    /// columns are split on `_`.
    pub fn normalize_table(&self, df: &mut DataFrame, columns: &[&str], composite: &[&str]) -> Result<()> {
        for column in columns {
            if frame::has(df, column) {
                self.normalize_column(df, column)?;
            }
        }
        for column in composite {
            if frame::has(df, column) {
                self.normalize_composite_column(df, column, '_')?;
            }
        }
        Ok(())
    }
}

static COMMON: Lazy<TeamCodeMap> = Lazy::new(|| TeamCodeMap {
    map: COMMON_CLUB_CODES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect(),
});

impl Default for TeamCodeMap {
    fn default() -> Self {
        Self::common()
    }
}

/// Team columns any provider or intermediate table may carry.
pub const TEAM_COLUMNS: &[&str] = &[
    "team",
    "team_abbr",
    "club_code",
    "home_team",
    "away_team",
    "posteam",
    "defteam",
    "opp_team",
    "fumbled_1_team",
    "fumbled_2_team",
    "recent_team",
    "opponent",
];

pub const COMPOSITE_COLUMNS: &[&str] = &["game_id"];
