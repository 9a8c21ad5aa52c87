// 🖥️ Terminal Viewer - Snapshot / Diagnostics / Summary pages
use crate::reconciliation::ReconciliationReport;
use crate::resolver::ValueSource;
use crate::summary::{GroupCount, GroupMean, WorkforceSummary};
use crate::table::EntityId;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Snapshot,
    Diagnostics,
    Summary,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Snapshot => Page::Diagnostics,
            Page::Diagnostics => Page::Summary,
            Page::Summary => Page::Snapshot,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Snapshot => Page::Summary,
            Page::Diagnostics => Page::Snapshot,
            Page::Summary => Page::Diagnostics,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Snapshot => "Snapshot",
            Page::Diagnostics => "Diagnostics",
            Page::Summary => "Summary",
        }
    }
}

/// One line of the detail panel: column, rendered value, where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLine {
    pub column: String,
    pub value: String,
    pub source: Option<&'static str>,
}

pub struct App {
    pub report: ReconciliationReport,
    rows: Vec<Vec<String>>,
    ids: Vec<Option<EntityId>>,
    pub state: TableState,
    pub diagnostics_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub summary: WorkforceSummary,
}

impl App {
    pub fn new(report: ReconciliationReport) -> Self {
        let marker = report.unknown_marker.clone();
        let rows = report.snapshot.render_rows(&marker);
        let ids = match report.snapshot.column_values(&report.key_column) {
            Some(cells) => cells.map(EntityId::from_value).collect(),
            None => vec![None; rows.len()],
        };

        let mut state = TableState::default();
        if !rows.is_empty() {
            state.select(Some(0));
        }

        let mut diagnostics_state = TableState::default();
        if !report.diagnostics.is_empty() {
            diagnostics_state.select(Some(0));
        }

        let summary = WorkforceSummary::build(&report.snapshot, None, &marker);

        Self {
            report,
            rows,
            ids,
            state,
            diagnostics_state,
            current_page: Page::Snapshot,
            show_detail: false,
            summary,
        }
    }

    /// Builder: replace the snapshot-only aggregates (e.g. with salary history)
    pub fn with_summary(mut self, summary: WorkforceSummary) -> Self {
        self.summary = summary;
        self
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Selection state and row count of the page being scrolled
    fn active(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Diagnostics => (&mut self.diagnostics_state, self.report.diagnostics.len()),
            _ => (&mut self.state, self.rows.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + PAGE_STEP).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| i.saturating_sub(PAGE_STEP));
        state.select(Some(i));
    }

    pub fn first(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }

    pub fn selected_entity(&self) -> Option<&EntityId> {
        self.state
            .selected()
            .and_then(|i| self.ids.get(i))
            .and_then(Option::as_ref)
    }

    /// Every column of the selected row, with provenance for attributes
    pub fn detail_lines(&self) -> Vec<DetailLine> {
        let Some(row) = self.state.selected().and_then(|i| self.rows.get(i)) else {
            return Vec::new();
        };
        let entity = self.selected_entity();

        self.report
            .snapshot
            .columns()
            .iter()
            .zip(row)
            .map(|(column, value)| {
                let source = self.report.attribute(column).map(|_| {
                    match entity.and_then(|id| self.report.provenance(id, column)) {
                        Some(ValueSource::Primary) => "history",
                        Some(ValueSource::Fallback) => "fallback",
                        None => "unresolved",
                    }
                });
                DetailLine {
                    column: column.clone(),
                    value: value.clone(),
                    source,
                }
            })
            .collect()
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Snapshot => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.first(),
                KeyCode::End => app.last(),
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
        Page::Snapshot if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            render_snapshot(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Snapshot => render_snapshot(f, chunks[1], app),
        Page::Diagnostics => render_diagnostics(f, chunks[1], app),
        Page::Summary => render_summary(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn label_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Snapshot, Page::Diagnostics, Page::Summary].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let diagnostics = &app.report.diagnostics;
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("As of {}", app.report.as_of.date()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Employees: {}", app.report.entity_count),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("⚠ {}", diagnostics.len()),
        Style::default().fg(if diagnostics.has_critical() {
            Color::Red
        } else {
            Color::Yellow
        }),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_snapshot(f: &mut Frame, area: Rect, app: &mut App) {
    let columns = app.report.snapshot.columns();
    let marker = app.report.unknown_marker.as_str();

    let header = Row::new(columns.iter().map(|c| Cell::from(c.clone()).style(header_style())))
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.rows.iter().map(|row| {
        let cells = row.iter().map(|value| {
            let style = if value == marker {
                Style::default().fg(Color::DarkGray)
            } else if value.starts_with("INVALID(") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Cell::from(truncate(value, 24)).style(style)
        });
        Row::new(cells).height(1)
    });

    let widths = vec![Constraint::Min(10); columns.len().max(1)];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" Snapshot · {} ", app.report.fingerprint.get(..12).unwrap_or(""))),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Employee Details ");

    let lines = app.detail_lines();
    if lines.is_empty() {
        f.render_widget(Paragraph::new("No employee selected").block(block), area);
        return;
    }

    let mut content = vec![Line::from("")];
    for line in &lines {
        let mut spans = vec![
            Span::styled(format!("  {}: ", line.column), label_style()),
            Span::raw(line.value.clone()),
        ];
        if let Some(source) = line.source {
            let color = match source {
                "history" => Color::Green,
                "fallback" => Color::Yellow,
                _ => Color::DarkGray,
            };
            spans.push(Span::raw("  "));
            spans.push(Span::styled(format!("[{}]", source), Style::default().fg(color)));
        }
        content.push(Line::from(spans));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_diagnostics(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(app.report.attributes.len() as u16 + 3),
            Constraint::Min(0),
        ])
        .split(area);

    // Resolution paths per attribute
    let header = Row::new(
        ["Attribute", "Path", "History", "Fallback", "Unknown", "Primary source"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = app.report.attributes.iter().map(|outcome| {
        Row::new(vec![
            Cell::from(outcome.name.clone()),
            Cell::from(outcome.path().as_str()),
            Cell::from(outcome.from_primary.to_string()).style(Style::default().fg(Color::Green)),
            Cell::from(outcome.from_fallback.to_string()).style(Style::default().fg(Color::Yellow)),
            Cell::from(outcome.unresolved.to_string()).style(Style::default().fg(Color::DarkGray)),
            Cell::from(outcome.primary.label()),
        ])
    });

    let paths = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Resolution Paths "),
    );
    f.render_widget(paths, chunks[0]);

    // Issues in the order they were raised
    let rows = app.report.diagnostics.iter().map(|d| {
        let color = match d.severity.as_str() {
            "critical" => Color::Red,
            "warning" => Color::Yellow,
            _ => Color::Cyan,
        };
        Row::new(vec![
            Cell::from(d.severity.as_str()).style(Style::default().fg(color)),
            Cell::from(d.table.clone().unwrap_or_default()),
            Cell::from(d.attribute.clone().unwrap_or_default()),
            Cell::from(d.issue.to_string()),
        ])
    });

    let issues = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(16),
            Constraint::Min(30),
        ],
    )
    .header(
        Row::new(
            ["Severity", "Table", "Attribute", "Issue"]
                .iter()
                .map(|h| Cell::from(*h).style(header_style())),
        )
        .style(Style::default().bg(Color::DarkGray)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Issues · {} ", app.report.diagnostics.summary())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(issues, chunks[1], &mut app.diagnostics_state);
}

fn bars(groups: &[GroupCount]) -> Vec<(&str, u64)> {
    groups.iter().map(|g| (g.group.as_str(), g.count as u64)).collect()
}

fn bordered(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn count_lines(groups: &[GroupCount]) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from("")];
    for group in groups {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<18}", truncate(&group.group, 18)), label_style()),
            Span::raw(format!("{:>6}", group.count)),
        ]));
    }
    lines
}

fn mean_lines(heading: &str, groups: &[GroupMean], lines: &mut Vec<Line<'static>>) {
    if groups.is_empty() {
        return;
    }
    lines.push(Line::from(Span::styled(format!("  {}", heading), header_style())));
    for group in groups {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<16}", truncate(&group.group, 16)), label_style()),
            Span::styled(format!("{:>12.2}", group.mean), Style::default().fg(Color::Green)),
            Span::styled(format!("  ({})", group.count), Style::default().fg(Color::DarkGray)),
        ]));
    }
    lines.push(Line::from(""));
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let stats = &app.summary;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let headcount = bars(&stats.headcount_by_department);
    let chart = BarChart::default()
        .block(bordered(" Headcount by Department "))
        .data(headcount.as_slice())
        .bar_width(9)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(chart, top[0]);

    let histogram = bars(&stats.salary_histogram);
    let chart = BarChart::default()
        .block(bordered(" Latest Salary Distribution "))
        .data(histogram.as_slice())
        .bar_width(13)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Green))
        .value_style(Style::default().fg(Color::Black).bg(Color::Green));
    f.render_widget(chart, top[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(50),
        ])
        .split(chunks[1]);

    // Demographics
    let mut people = count_lines(&stats.age_groups);
    for (heading, groups) in [
        ("Gender", &stats.gender),
        ("Location", &stats.location),
        ("Employment type", &stats.employment_type),
    ] {
        if !groups.is_empty() {
            people.push(Line::from(""));
            people.push(Line::from(Span::styled(format!("  {}", heading), header_style())));
            people.extend(count_lines(groups).into_iter().skip(1));
        }
    }
    f.render_widget(Paragraph::new(people).block(bordered(" Age Groups & People ")), bottom[0]);

    f.render_widget(
        Paragraph::new(count_lines(&stats.top_titles)).block(bordered(" Top Job Titles ")),
        bottom[1],
    );

    let mut salary = vec![Line::from("")];
    mean_lines("By department", &stats.salary_by_department, &mut salary);
    mean_lines("By gender", &stats.salary_by_gender, &mut salary);
    mean_lines("By year", &stats.salary_by_year, &mut salary);
    f.render_widget(Paragraph::new(salary).block(bordered(" Mean Salary ")), bottom[2]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Diagnostics => (app.diagnostics_state.selected(), app.report.diagnostics.len()),
        _ => (app.state.selected(), app.rows.len()),
    };
    let selected = selected.map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, total), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr;
    use crate::reconciliation::ReconciliationEngine;
    use crate::table::{Table, TableSet, Value};
    use crate::temporal::AsOf;
    use chrono::NaiveDate;

    fn app(employees: i64) -> App {
        let employee = Table::from_rows(
            hr::EMPLOYEE,
            [hr::EMPLOYEE_ID],
            (1..=employees).map(|i| vec![Value::Int(i)]),
        )
        .unwrap();
        let salary = Table::from_rows(
            hr::SALARY,
            [hr::EMPLOYEE_ID, "amount", hr::FROM_DATE],
            vec![vec![
                Value::Int(1),
                Value::Int(50_000),
                Value::Timestamp(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()),
            ]],
        )
        .unwrap();

        let inputs = TableSet::new().with(employee).with(salary);
        let as_of = AsOf::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &hr::snapshot_request(), &as_of)
            .unwrap();
        App::new(report)
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app(3);
        assert_eq!(app.state.selected(), Some(0));

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_page_jumps_clamp() {
        let mut app = app(30);
        app.page_down();
        assert_eq!(app.state.selected(), Some(20));
        app.page_down();
        assert_eq!(app.state.selected(), Some(29));
        app.page_up();
        assert_eq!(app.state.selected(), Some(9));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_pages_cycle() {
        let mut app = app(1);
        app.next_page();
        assert_eq!(app.current_page, Page::Diagnostics);
        app.next_page();
        app.next_page();
        assert_eq!(app.current_page, Page::Snapshot);
        app.previous_page();
        assert_eq!(app.current_page, Page::Summary);
    }

    #[test]
    fn test_detail_lines_carry_provenance() {
        let mut app = app(2);
        let lines = app.detail_lines();
        let salary = lines.iter().find(|l| l.column == hr::LATEST_SALARY).unwrap();
        assert_eq!(salary.value, "50000");
        assert_eq!(salary.source, Some("history"));

        let key = lines.iter().find(|l| l.column == hr::EMPLOYEE_ID).unwrap();
        assert_eq!(key.source, None);

        app.next();
        let lines = app.detail_lines();
        let salary = lines.iter().find(|l| l.column == hr::LATEST_SALARY).unwrap();
        assert_eq!(salary.value, "N/A");
        assert_eq!(salary.source, Some("unresolved"));
    }

    #[test]
    fn test_summary_defaults_to_snapshot_only() {
        let app = app(2);
        assert_eq!(app.summary.age_groups.len(), crate::summary::AGE_BUCKETS.len());
        assert_eq!(app.summary.salary_histogram.iter().map(|g| g.count).sum::<usize>(), 1);
        assert!(app.summary.salary_by_year.is_empty());

        let replaced = WorkforceSummary {
            gender: vec![GroupCount { group: "F".into(), count: 2 }],
            ..WorkforceSummary::default()
        };
        let app = app.with_summary(replaced.clone());
        assert_eq!(app.summary, replaced);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Ingeniería de Software", 10), "Ingenie...");
        assert_eq!(truncate("short", 10), "short");
    }
}
