use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::stdout;

use crate::board::{self, BoardData, PrevBoard};
use crate::db::Database;
use crate::fetch::StatsClient;
use crate::models::UserStats;
use crate::period::{self, Granularity};

const TABS: [&str; 5] = ["All Time", "Weekly", "Monthly", "Yearly", "Jobs"];

struct AppState {
    data: BoardData,
    prev: [Option<PrevBoard>; 3],
    tab: usize,
    selected: usize,
    show_prev: bool,
}

impl AppState {
    fn new(data: BoardData) -> Self {
        Self {
            data,
            prev: [None, None, None],
            tab: 0,
            selected: 0,
            show_prev: false,
        }
    }

    fn granularity(&self) -> Option<Granularity> {
        match self.tab {
            1 => Some(Granularity::Weekly),
            2 => Some(Granularity::Monthly),
            3 => Some(Granularity::Yearly),
            _ => None,
        }
    }

    fn rows(&self) -> &[UserStats] {
        match self.tab {
            0 => &self.data.all_time,
            4 => &self.data.jobs,
            n => {
                if self.show_prev {
                    if let Some(Some(PrevBoard::Board { rows, .. })) = self.prev.get(n - 1) {
                        return rows;
                    }
                    &[]
                } else {
                    &self.data.periods[n - 1].rows
                }
            }
        }
    }

    fn current_row(&self) -> Option<&UserStats> {
        self.rows().get(self.selected)
    }

    fn next_tab(&mut self) {
        self.tab = (self.tab + 1) % TABS.len();
        self.selected = 0;
        self.show_prev = false;
    }

    fn prev_tab(&mut self) {
        self.tab = (self.tab + TABS.len() - 1) % TABS.len();
        self.selected = 0;
        self.show_prev = false;
    }

    fn next(&mut self) {
        let len = self.rows().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn toggle_prev(&mut self, db: &Database) {
        let Some(granularity) = self.granularity() else {
            return;
        };
        if !self.show_prev {
            let slot = self.tab - 1;
            if self.prev[slot].is_none() {
                self.prev[slot] = board::previous_board(db, granularity).ok();
            }
        }
        self.show_prev = !self.show_prev;
        self.selected = 0;
    }
}

pub fn run_browse(db: &Database, client: &StatsClient) -> Result<()> {
    println!("Fetching stats for the roster...");
    let data = board::refresh(db, client)?;
    if data.all_time.is_empty() {
        println!("Roster is empty. Add someone with 'grind user add <username>'.");
        return Ok(());
    }

    let mut state = AppState::new(data);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db, client);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
    client: &StatsClient,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => state.next_tab(),
                KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => state.prev_tab(),
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('p') => state.toggle_prev(db),
                KeyCode::Char('r') => {
                    if let Ok(data) = board::refresh(db, client) {
                        state.data = data;
                        state.prev = [None, None, None];
                        state.selected = 0;
                        state.show_prev = false;
                    }
                }
                _ => {}
            }
            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let tabs = Tabs::new(TABS.to_vec())
        .select(state.tab)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let mut items: Vec<ListItem> = vec![ListItem::new(Span::styled(
        format!(
            "  {:<4} {:<20} {:>6} {:>6} {:>6} {:>7} {:>6} {:>9}",
            "#", "USER", "EASY", "MED", "HARD", "TOTAL", "JOBS", "XP"
        ),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    items.extend(state.rows().iter().enumerate().map(|(i, row)| {
        let line = if row.error.is_some() {
            format!(
                "  {:<4} {:<20} {:>50}",
                i + 1,
                clip(row.display_name(), 18),
                "fetch failed"
            )
        } else {
            format!(
                "  {:<4} {:<20} {:>6} {:>6} {:>6} {:>7} {:>6} {:>9.1}",
                i + 1,
                clip(row.display_name(), 18),
                row.easy,
                row.medium,
                row.hard,
                row.total,
                row.jobs_applied,
                row.xp
            )
        };
        ListItem::new(line)
    }));

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(board_title(state)))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, chunks[1], list_state);

    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, chunks[2]);

    let help = Paragraph::new(
        " tab/h/l:switch board  j/k:navigate  p:previous period  r:refresh  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}

fn board_title(state: &AppState) -> String {
    match state.granularity() {
        None => format!(" {} ", TABS[state.tab]),
        Some(granularity) => {
            if state.show_prev {
                match &state.prev[state.tab - 1] {
                    Some(PrevBoard::Board { period_key, .. }) => {
                        format!(" Previous {} ({}) ", granularity.label(), period_key)
                    }
                    Some(PrevBoard::NoBaseline { period_key, .. }) => {
                        format!(" Previous {} ({}) - no baseline ", granularity.label(), period_key)
                    }
                    None => format!(" Previous {} ", granularity.label()),
                }
            } else {
                let period_board = &state.data.periods[state.tab - 1];
                format!(
                    " {} ({}) - resets in {} ",
                    granularity.label(),
                    period_board.period_key,
                    period::format_remaining(period_board.remaining_ms)
                )
            }
        }
    }
}

fn build_detail(state: &AppState) -> Text<'static> {
    if state.show_prev {
        if let Some(granularity) = state.granularity() {
            if let Some(Some(PrevBoard::NoBaseline { period_key, .. })) =
                state.prev.get(state.tab - 1)
            {
                return Text::raw(format!(
                    "No baseline was captured for {} {} - there is nothing to reconstruct.",
                    granularity.as_str(),
                    period_key
                ));
            }
        }
    }
    if let Some(granularity) = state.granularity() {
        if !state.show_prev && state.data.periods[state.tab - 1].baseline_missing {
            return Text::raw(format!(
                "No {} baseline captured yet - progress shows zero until one is stored.",
                granularity.as_str()
            ));
        }
    }

    let Some(row) = state.current_row() else {
        return Text::raw("No row selected");
    };

    let mut lines: Vec<Line> = vec![Line::from(Span::styled(
        format!("{} ({})", row.display_name(), row.username),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    match &row.error {
        Some(error) => {
            for line in textwrap::fill(&format!("fetch error: {}", error), 70).lines() {
                lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        None => {
            lines.push(Line::from(format!(
                "easy {}  medium {}  hard {}  total {}  jobs {}  xp {:.1}",
                row.easy, row.medium, row.hard, row.total, row.jobs_applied, row.xp
            )));
        }
    }
    Text::from(lines)
}

fn clip(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
