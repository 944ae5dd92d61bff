use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use polars::prelude::*;

use crate::frame;
use crate::schema;
use crate::table_io;
use crate::teams::{COMPOSITE_COLUMNS, TEAM_COLUMNS, TeamCodeMap};

pub const LEADER_LIMIT: usize = 20;
pub const EMPTY_SELECTION: &str = "No data selected.";

/// The game-by-game receiving table the dashboard browses.
#[derive(Debug, Clone)]
pub struct FantasyData {
    df: DataFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderRow {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub receiving_yards: f64,
    pub receptions: f64,
    pub targets: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOption {
    pub player_id: String,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekYards {
    pub label: String,
    pub yards: f64,
}

impl FantasyData {
    pub fn load(path: &Path) -> Result<Self> {
        let df = table_io::read_csv(path)?;
        Self::from_frame(df).with_context(|| format!("load {}", path.display()))
    }

    pub fn from_frame(mut df: DataFrame) -> Result<Self> {
        schema::GAME_BY_GAME.validate(&df)?;
        TeamCodeMap::common().normalize_table(&mut df, TEAM_COLUMNS, COMPOSITE_COLUMNS)?;
        Ok(Self { df })
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn teams(&self) -> Vec<String> {
        self.distinct("team")
    }

    pub fn positions(&self) -> Vec<String> {
        self.distinct("position")
    }

    fn distinct(&self, column: &str) -> Vec<String> {
        let values: BTreeSet<String> = frame::texts_or_null(&self.df, column)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        values.into_iter().collect()
    }

    /// Players ordered by name, one entry per id.
    pub fn players(&self) -> Vec<PlayerOption> {
        let ids = frame::texts_or_null(&self.df, "player_id").unwrap_or_default();
        let names = frame::texts_or_null(&self.df, "player_name").unwrap_or_default();
        let mut seen: HashMap<String, String> = HashMap::new();
        for (id, name) in ids.into_iter().zip(names) {
            let Some(id) = id else {
                continue;
            };
            let name = name.unwrap_or_else(|| id.clone());
            seen.entry(id).or_insert(name);
        }
        let mut players: Vec<PlayerOption> = seen
            .into_iter()
            .map(|(player_id, player_name)| PlayerOption { player_id, player_name })
            .collect();
        players.sort_by(|a, b| {
            a.player_name
                .cmp(&b.player_name)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        players
    }

    /// Yards, receptions and targets summed per player id and team over the
    /// rows matching both filters, best `limit` by yards.
    pub fn receiving_leaders(&self, teams: &[String], positions: &[String], limit: usize) -> Result<Vec<LeaderRow>> {
        let summed = |c: &str| col(c).cast(DataType::Float64).fill_null(lit(0.0)).sum().alias(c);
        let totals = self
            .df
            .clone()
            .lazy()
            .filter(
                frame::any_of("team", teams)
                    .and(frame::any_of("position", positions))
                    .and(col("player_id").is_not_null()),
            )
            .group_by_stable([col("player_id"), col("team")])
            .agg([
                col("player_name").cast(DataType::String).first(),
                summed("receiving_yards"),
                summed("receptions"),
                summed("total_targets"),
            ])
            .sort(
                ["receiving_yards"],
                SortMultipleOptions::default()
                    .with_order_descending(true)
                    .with_maintain_order(true),
            )
            .limit(limit as IdxSize)
            .collect()?;

        let ids = frame::texts(&totals, "player_id")?;
        let names = frame::texts(&totals, "player_name")?;
        let team_codes = frame::texts(&totals, "team")?;
        let yards = frame::floats(&totals, "receiving_yards")?;
        let receptions = frame::floats(&totals, "receptions")?;
        let targets = frame::floats(&totals, "total_targets")?;
        Ok((0..totals.height())
            .map(|r| LeaderRow {
                player_id: ids[r].clone().unwrap_or_default(),
                player_name: names[r].clone().unwrap_or_default(),
                team: team_codes[r].clone().unwrap_or_default(),
                receiving_yards: yards[r].unwrap_or(0.0),
                receptions: receptions[r].unwrap_or(0.0),
                targets: targets[r].unwrap_or(0.0),
            })
            .collect())
    }

    pub fn weekly_yards(&self, player_id: &str) -> Result<Vec<WeekYards>> {
        let ids = frame::texts(&self.df, "player_id")?;
        let seasons = frame::ints(&self.df, "season")?;
        let weeks = frame::ints(&self.df, "week")?;
        let yards = frame::floats(&self.df, "receiving_yards")?;
        let mut games: Vec<(i64, i64, f64)> = (0..self.df.height())
            .filter(|&r| ids[r].as_deref() == Some(player_id))
            .filter_map(|r| Some((seasons[r]?, weeks[r]?, yards[r].unwrap_or(0.0))))
            .collect();
        games.sort_by_key(|&(season, week, _)| (season, week));
        Ok(games
            .into_iter()
            .map(|(season, week, yards)| WeekYards {
                label: format!("{season} W{week}"),
                yards,
            })
            .collect())
    }
}

/// A checklist with a cursor. Everything starts selected.
#[derive(Debug, Clone)]
pub struct MultiSelect {
    options: Vec<String>,
    selected: Vec<bool>,
    cursor: usize,
}

impl MultiSelect {
    pub fn new(options: Vec<String>) -> Self {
        let selected = vec![true; options.len()];
        Self {
            options,
            selected,
            cursor: 0,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_selected(&self, idx: usize) -> bool {
        self.selected.get(idx).copied().unwrap_or(false)
    }

    pub fn all_selected(&self) -> bool {
        self.selected.iter().all(|s| *s)
    }

    pub fn next(&mut self) {
        if !self.options.is_empty() {
            self.cursor = (self.cursor + 1) % self.options.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.options.is_empty() {
            self.cursor = (self.cursor + self.options.len() - 1) % self.options.len();
        }
    }

    pub fn toggle(&mut self) {
        if let Some(flag) = self.selected.get_mut(self.cursor) {
            *flag = !*flag;
        }
    }

    /// Selects everything, or clears everything when all are already selected.
    pub fn toggle_all(&mut self) {
        let value = !self.all_selected();
        self.selected.iter_mut().for_each(|s| *s = value);
    }

    pub fn values(&self) -> Vec<String> {
        self.options
            .iter()
            .zip(&self.selected)
            .filter(|(_, s)| **s)
            .map(|(o, _)| o.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Leaders,
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Teams,
    Positions,
}

pub struct DashboardState {
    pub data: FantasyData,
    pub page: Page,
    pub focus: Focus,
    pub teams: MultiSelect,
    pub positions: MultiSelect,
    pub players: Vec<PlayerOption>,
    pub player_cursor: usize,
    pub leaders: Vec<LeaderRow>,
    pub weekly: Vec<WeekYards>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl DashboardState {
    pub fn new(data: FantasyData) -> Self {
        let teams = MultiSelect::new(data.teams());
        let positions = MultiSelect::new(data.positions());
        let players = data.players();
        let mut state = Self {
            data,
            page: Page::Leaders,
            focus: Focus::Teams,
            teams,
            positions,
            players,
            player_cursor: 0,
            leaders: Vec::new(),
            weekly: Vec::new(),
            logs: VecDeque::with_capacity(200),
            help_overlay: false,
        };
        state.push_log(format!("[INFO] Loaded {} player-games", state.data.len()));
        state.refresh_leaders();
        state.refresh_weekly();
        state
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        let stamp = Local::now().format("%H:%M:%S");
        self.logs.push_back(format!("{stamp} {}", msg.into()));
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn refresh_leaders(&mut self) {
        match self
            .data
            .receiving_leaders(&self.teams.values(), &self.positions.values(), LEADER_LIMIT)
        {
            Ok(leaders) => self.leaders = leaders,
            Err(err) => {
                self.leaders.clear();
                self.push_log(format!("[ERROR] Leaders unavailable: {err:#}"));
            }
        }
    }

    pub fn refresh_weekly(&mut self) {
        let result = match self.selected_player() {
            Some(player) => self.data.weekly_yards(&player.player_id),
            None => Ok(Vec::new()),
        };
        match result {
            Ok(weekly) => self.weekly = weekly,
            Err(err) => {
                self.weekly.clear();
                self.push_log(format!("[ERROR] Weekly yards unavailable: {err:#}"));
            }
        }
    }

    pub fn selected_player(&self) -> Option<&PlayerOption> {
        self.players.get(self.player_cursor)
    }

    pub fn toggle_page(&mut self) {
        self.page = match self.page {
            Page::Leaders => Page::Player,
            Page::Player => Page::Leaders,
        };
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Teams => Focus::Positions,
            Focus::Positions => Focus::Teams,
        };
    }

    fn focused(&mut self) -> &mut MultiSelect {
        match self.focus {
            Focus::Teams => &mut self.teams,
            Focus::Positions => &mut self.positions,
        }
    }

    pub fn select_next(&mut self) {
        match self.page {
            Page::Leaders => self.focused().next(),
            Page::Player => {
                if !self.players.is_empty() {
                    self.player_cursor = (self.player_cursor + 1) % self.players.len();
                    self.refresh_weekly();
                }
            }
        }
    }

    pub fn select_prev(&mut self) {
        match self.page {
            Page::Leaders => self.focused().prev(),
            Page::Player => {
                if !self.players.is_empty() {
                    self.player_cursor = (self.player_cursor + self.players.len() - 1) % self.players.len();
                    self.refresh_weekly();
                }
            }
        }
    }

    pub fn toggle_selected(&mut self) {
        if self.page != Page::Leaders {
            return;
        }
        self.focused().toggle();
        self.refresh_leaders();
    }

    pub fn toggle_all(&mut self) {
        if self.page != Page::Leaders {
            return;
        }
        let label = match self.focus {
            Focus::Teams => "teams",
            Focus::Positions => "positions",
        };
        self.focused().toggle_all();
        let state = if self.focused().all_selected() { "selected" } else { "cleared" };
        self.push_log(format!("[INFO] All {label} {state}"));
        self.refresh_leaders();
    }
}
