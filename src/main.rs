use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph};

use wr_features::config::PipelineConfig;
use wr_features::dashboard::{DashboardState, EMPTY_SELECTION, FantasyData, Focus, MultiSelect, Page};

struct App {
    state: DashboardState,
    should_quit: bool,
}

impl App {
    fn new(state: DashboardState) -> Self {
        Self {
            state,
            should_quit: false,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('1') => self.state.page = Page::Leaders,
            KeyCode::Char('2') => self.state.page = Page::Player,
            KeyCode::Tab => self.state.toggle_page(),
            KeyCode::Char('f') | KeyCode::Left | KeyCode::Right => self.state.cycle_focus(),
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char(' ') | KeyCode::Enter => self.state.toggle_selected(),
            KeyCode::Char('a') | KeyCode::Char('A') => self.state.toggle_all(),
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Esc => self.state.help_overlay = false,
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let config = PipelineConfig::load()?;
    let path = config.game_by_game_path();
    let data = FantasyData::load(&path).context("dashboard data unavailable; run `ingest` first")?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(DashboardState::new(data));
    app.state.push_log(format!("[INFO] Source {}", path.display()));
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.page {
        Page::Leaders => render_leaders(frame, chunks[1], &app.state),
        Page::Player => render_player(frame, chunks[1], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::TOP));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &DashboardState) -> String {
    let title = match state.page {
        Page::Leaders => format!(
            "WR FANTASY | LEADERS | Teams {}/{} | Positions {}/{}",
            state.teams.values().len(),
            state.teams.options().len(),
            state.positions.values().len(),
            state.positions.options().len()
        ),
        Page::Player => match state.selected_player() {
            Some(player) => format!("WR FANTASY | PLAYER | {}", player.player_name),
            None => "WR FANTASY | PLAYER".to_string(),
        },
    };
    let line1 = format!("  __   {}", title);
    let line2 = " (__)".to_string();
    let line3 = format!("       {} player-games", state.data.len());
    format!("{line1}\n{line2}\n{line3}")
}

fn footer_text(state: &DashboardState) -> String {
    match state.page {
        Page::Leaders => {
            "1 Leaders | 2 Player | f/←/→ Filter | j/k/↑/↓ Move | Space Toggle | a All | ? Help | q Quit".to_string()
        }
        Page::Player => "1 Leaders | 2 Player | j/k/↑/↓ Player | ? Help | q Quit".to_string(),
    }
}

fn render_leaders(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(18),
            Constraint::Length(18),
            Constraint::Min(20),
        ])
        .split(area);

    render_filter(frame, columns[0], "Teams", &state.teams, state.focus == Focus::Teams);
    render_filter(
        frame,
        columns[1],
        "Positions",
        &state.positions,
        state.focus == Focus::Positions,
    );

    let block = Block::default()
        .title("Receiving yards leaders")
        .borders(Borders::ALL);
    if state.leaders.is_empty() {
        frame.render_widget(Paragraph::new(EMPTY_SELECTION).block(block), columns[2]);
        return;
    }

    let bars: Vec<Bar> = state
        .leaders
        .iter()
        .map(|row| {
            Bar::default()
                .value(row.receiving_yards.max(0.0).round() as u64)
                .label(Line::from(format!("{} ({})", row.player_name, row.team)))
                .text_value(format!(
                    "{:.0} yds {:.0} rec {:.0} tgt",
                    row.receiving_yards, row.receptions, row.targets
                ))
                .style(Style::default().fg(Color::Cyan))
        })
        .collect();
    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .group_gap(0);
    frame.render_widget(chart, columns[2]);
}

fn render_filter(frame: &mut Frame, area: Rect, title: &str, select: &MultiSelect, focused: bool) {
    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(select.cursor(), select.options().len(), visible);
    let text = (start..end)
        .map(|idx| {
            let mark = if select.is_selected(idx) { "[x]" } else { "[ ]" };
            let pointer = if focused && idx == select.cursor() { ">" } else { " " };
            format!("{pointer}{mark} {}", select.options()[idx])
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut block = Block::default().title(title.to_string()).borders(Borders::ALL);
    if focused {
        block = block.border_style(Style::default().add_modifier(Modifier::BOLD));
    }
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_player(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(20)])
        .split(area);

    let visible = columns[0].height.saturating_sub(2) as usize;
    let (start, end) = visible_range(state.player_cursor, state.players.len(), visible);
    let list = (start..end)
        .map(|idx| {
            let pointer = if idx == state.player_cursor { ">" } else { " " };
            format!("{pointer} {}", state.players[idx].player_name)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let picker = Paragraph::new(list).block(Block::default().title("Player").borders(Borders::ALL));
    frame.render_widget(picker, columns[0]);

    let block = Block::default()
        .title("Receiving yards by week")
        .borders(Borders::ALL);
    if state.weekly.is_empty() {
        frame.render_widget(Paragraph::new(EMPTY_SELECTION).block(block), columns[1]);
        return;
    }
    let bars: Vec<Bar> = state
        .weekly
        .iter()
        .map(|week| {
            Bar::default()
                .value(week.yards.max(0.0).round() as u64)
                .label(Line::from(week.label.clone()))
                .style(Style::default().fg(Color::Green))
        })
        .collect();
    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(7)
        .bar_gap(1);
    frame.render_widget(chart, columns[1]);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn console_text(state: &DashboardState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "WR Fantasy Dashboard - Help",
        "",
        "Global:",
        "  1 / 2 / Tab  Leaders / Player",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Leaders:",
        "  f / ← / →    Switch filter",
        "  j/k or ↑/↓   Move",
        "  Space/Enter  Toggle option",
        "  a            Select all / clear",
        "",
        "Player:",
        "  j/k or ↑/↓   Pick player",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
