use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use okr_tracker::{
    format_br, format_br_date, format_compact, Checkpoint, CheckpointStatus, DashboardStats,
    KeyResult, KeyResultSummary, Objective, Tier,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    KeyResults,
    Objectives,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::KeyResults => Page::Objectives,
            Page::Objectives => Page::KeyResults,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::KeyResults => "Resultados-Chave",
            Page::Objectives => "Objetivos",
        }
    }
}

/// One table row: the key result plus what the detail panel needs
#[derive(Debug, Clone)]
pub struct KeyResultRow {
    pub summary: KeyResultSummary,
    pub objective_title: String,
    pub unit_path: String,
    pub checkpoints: Vec<Checkpoint>,
}

pub struct App {
    pub rows: Vec<KeyResultRow>,
    pub filtered_rows: Vec<KeyResultRow>,
    pub stats: DashboardStats,
    pub state: TableState,
    pub objectives_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub tier_filter: Option<Tier>,
    pub today: NaiveDate,
}

impl App {
    pub fn new(
        objectives: Vec<Objective>,
        key_results: Vec<KeyResult>,
        mut checkpoints: HashMap<String, Vec<Checkpoint>>,
        today: NaiveDate,
    ) -> Self {
        let stats = DashboardStats::build(&objectives, &key_results, today);
        let by_id: HashMap<&str, &Objective> =
            objectives.iter().map(|o| (o.id.as_str(), o)).collect();

        let rows: Vec<KeyResultRow> = key_results
            .iter()
            .map(|kr| {
                let objective = by_id.get(kr.objective_id.as_str());
                let mut cps = checkpoints.remove(&kr.id).unwrap_or_default();
                for cp in &mut cps {
                    cp.refresh_status(today);
                }

                KeyResultRow {
                    summary: kr.summary_on(today),
                    objective_title: objective.map(|o| o.title.clone()).unwrap_or_default(),
                    unit_path: objective.map(|o| o.org_unit.path()).unwrap_or_default(),
                    checkpoints: cps,
                }
            })
            .collect();

        let mut state = TableState::default();
        if !rows.is_empty() {
            state.select(Some(0));
        }

        let mut objectives_state = TableState::default();
        objectives_state.select(Some(0));

        Self {
            filtered_rows: rows.clone(),
            rows,
            stats,
            state,
            objectives_state,
            current_page: Page::KeyResults,
            show_detail: false,
            tier_filter: None,
            today,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_row(&self) -> Option<&KeyResultRow> {
        self.state.selected().and_then(|i| self.filtered_rows.get(i))
    }

    pub fn apply_filter(&mut self, tier: Option<Tier>) {
        self.tier_filter = tier;

        self.filtered_rows = match tier {
            None => self.rows.clone(),
            Some(t) => self.rows.iter().filter(|r| r.summary.tier == t).cloned().collect(),
        };

        // Reset selection to first item
        if !self.filtered_rows.is_empty() {
            self.state.select(Some(0));
        } else {
            self.state.select(None);
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    fn page_len(&self) -> usize {
        match self.current_page {
            Page::KeyResults => self.filtered_rows.len(),
            Page::Objectives => self.stats.objectives.len(),
        }
    }

    fn page_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::KeyResults => &mut self.state,
            Page::Objectives => &mut self.objectives_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.page_len();
        if len == 0 {
            return;
        }
        let state = self.page_state();
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.page_len();
        if len == 0 {
            return;
        }
        let state = self.page_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.page_len();
        if len == 0 {
            return;
        }
        let state = self.page_state();
        let i = state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let state = self.page_state();
        let i = state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::Char('0') => app.apply_filter(None),
                KeyCode::Char(c @ '1'..='4') => {
                    let index = c as usize - '1' as usize;
                    app.apply_filter(Some(Tier::all()[index]));
                    app.current_page = Page::KeyResults;
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.page_state().select(Some(0)),
                KeyCode::End => {
                    let len = app.page_len();
                    if len > 0 {
                        app.page_state().select(Some(len - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::KeyResults if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);

            render_key_results(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::KeyResults => render_key_results(f, chunks[1], app),
        Page::Objectives => render_objectives(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::AwaitingPeriod => Color::DarkGray,
        Tier::NeedsAttention => Color::Red,
        Tier::AlmostThere => Color::Yellow,
        Tier::GoalMet => Color::Green,
    }
}

fn checkpoint_color(status: CheckpointStatus) -> Color {
    match status {
        CheckpointStatus::Pending => Color::DarkGray,
        CheckpointStatus::InProgress => Color::Yellow,
        CheckpointStatus::Completed => Color::Green,
        CheckpointStatus::Overdue => Color::Red,
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::KeyResults, Page::Objectives].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Média: {}", app.stats.average_progress_display),
        Style::default().fg(Color::White),
    ));

    for count in &app.stats.by_tier {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("{} {}", count.label, count.count),
            Style::default().fg(tier_color(count.tier)),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

    f.render_widget(header, area);
}

fn render_key_results(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&[
        "Objetivo",
        "Resultado-Chave",
        "Atual",
        "Meta",
        "Progresso",
        "Status",
        "Prazo",
    ]);

    let rows = app.filtered_rows.iter().map(|row| {
        let s = &row.summary;
        let color = tier_color(s.tier);

        Row::new(vec![
            Cell::from(truncate(&row.objective_title, 22)),
            Cell::from(truncate(&s.title, 30)),
            Cell::from(s.current_value_display.clone()),
            Cell::from(s.total_target_display.clone()),
            Cell::from(s.progress_display.clone()).style(Style::default().fg(color)),
            Cell::from(s.tier_label.clone()).style(Style::default().fg(color)),
            Cell::from(s.end_date_display.clone()),
        ])
        .height(1)
    });

    let title = match app.tier_filter {
        Some(tier) => format!(" Resultados-Chave - {} ", tier.label()),
        None => " Resultados-Chave ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(32),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(22),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_objectives(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["Objetivo", "Unidade", "KRs", "Progresso"]);

    let rows = app.stats.objectives.iter().map(|o| {
        Row::new(vec![
            Cell::from(truncate(&o.title, 34)),
            Cell::from(truncate(&o.unit_path, 40)),
            Cell::from(o.key_results.to_string()),
            Cell::from(o.progress_display.clone()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(36),
            Constraint::Length(42),
            Constraint::Length(6),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Objetivos "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.objectives_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::KeyResults => (app.state.selected(), app.filtered_rows.len()),
        Page::Objectives => (app.objectives_state.selected(), app.stats.objectives.len()),
    };

    let mut spans = vec![Span::styled(
        format!(" Linha: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(tier) = app.tier_filter {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("Filtro: {}", tier.label()),
            Style::default().fg(tier_color(tier)),
        ));
        spans.push(Span::raw(" ("));
        spans.push(Span::styled("0", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" limpar)"));
    }

    let hints = [
        ("1-4", " Status | "),
        ("Enter", " Checkpoints | "),
        ("Tab", " Página | "),
        ("↑/↓", " Nav | "),
    ];
    for (key, text) in hints {
        if key == "1-4" {
            spans.push(Span::raw(" | "));
        }
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(text));
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Sair"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Checkpoints ");

    let row = match app.selected_row() {
        Some(r) => r,
        None => {
            let empty = Paragraph::new("Nenhum resultado-chave selecionado").block(block);
            f.render_widget(empty, area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Objetivo: ", label),
            Span::raw(row.objective_title.clone()),
        ]),
        Line::from(vec![Span::styled("  Unidade: ", label), Span::raw(row.unit_path.clone())]),
        Line::from(vec![
            Span::styled("  Frequência: ", label),
            Span::raw(row.summary.frequency.label()),
        ]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
    ];

    if row.checkpoints.is_empty() {
        content.push(Line::from("  Sem checkpoints"));
    }

    for cp in &row.checkpoints {
        let actual = cp.actual_value.map(format_br).unwrap_or_else(|| "-".to_string());
        content.push(Line::from(vec![
            Span::styled(format!("  {:<12}", cp.period_label), label),
            Span::raw(format!("{:>12} / {:<12}", actual, format_br(cp.target_value))),
            Span::raw(format!(" {:>6}% ", format_compact(cp.progress(), 1))),
            Span::styled(cp.status.as_str(), Style::default().fg(checkpoint_color(cp.status))),
            Span::styled(
                format!("  {}", format_br_date(cp.due_date)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Enter para fechar",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
