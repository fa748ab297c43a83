use crate::api::coincap::ws::{ConnectionState, PriceTick};
use crate::api::{FetchOutcome, Providers};
use crate::app::App;
use crate::engine::alerts::{Direction as AlertDirection, SubjectKind};
use crate::engine::cache::{CacheEntry, CacheStatus, Snapshot};
use crate::engine::schedule::start_periodic_refresh;
use crate::format::{format_change, format_compact_usd, format_usd, truncate};
use chrono::Local;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use log::{info, warn};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::error::Error;
use std::io;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

type DynError = Box<dyn Error + Send + Sync>;

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);
const FETCH_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardView {
    Prices,
    Weather,
    News,
    Alerts,
}

/// Threshold being typed for the selected coin or city.
#[derive(Debug, Clone)]
struct AlertInput {
    subject: String,
    kind: SubjectKind,
    direction: AlertDirection,
    buffer: String,
}

pub struct Dashboard {
    app: App,
    providers: Providers,
    current_view: DashboardView,
    selected: usize,
    /// Position in the newest-first notification list.
    notification_cursor: usize,
    input: Option<AlertInput>,
    status_line: Option<String>,
    running: bool,
}

impl Dashboard {
    pub fn new(app: App, providers: Providers) -> Self {
        Self {
            app,
            providers,
            current_view: DashboardView::Prices,
            selected: 0,
            notification_cursor: 0,
            input: None,
            status_line: None,
            running: true,
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Takes over the terminal until the user quits. The terminal is restored
    /// even when the loop fails.
    pub async fn run(
        &mut self,
        ticks: broadcast::Receiver<PriceTick>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Result<(), DynError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal, ticks, connection).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        mut ticks: broadcast::Receiver<PriceTick>,
        mut connection: watch::Receiver<ConnectionState>,
    ) -> Result<(), DynError> {
        let (fetch_tx, mut fetch_rx) = mpsc::channel::<FetchOutcome>(FETCH_CHANNEL_SIZE);
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
        let refresh = start_periodic_refresh(self.app.preferences().refresh_interval, move || {
            // A refresh already queued covers this one.
            let _ = refresh_tx.try_send(());
        });

        let mut events = EventStream::new();
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        let mut feed_open = true;
        let mut state_open = true;

        let initial = *connection.borrow_and_update();
        self.app.set_connection(initial);
        self.spawn_refresh(false, &fetch_tx);

        while self.running {
            terminal.draw(|f| self.render(f))?;

            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        self.handle_key_input(key, &fetch_tx);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        refresh.cancel();
                        return Err(e.into());
                    }
                    None => self.running = false,
                },
                Some(outcome) = fetch_rx.recv() => {
                    self.app.apply_fetch(outcome);
                }
                tick = ticks.recv(), if feed_open => match tick {
                    Ok(tick) => {
                        self.app.on_tick(&tick);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dashboard fell behind, skipped {} price ticks", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => feed_open = false,
                },
                changed = connection.changed(), if state_open => match changed {
                    Ok(()) => {
                        let state = *connection.borrow_and_update();
                        self.app.set_connection(state);
                    }
                    Err(_) => state_open = false,
                },
                Some(()) = refresh_rx.recv() => self.spawn_refresh(false, &fetch_tx),
                _ = redraw.tick() => {}
            }
        }

        refresh.cancel();
        Ok(())
    }

    fn spawn_refresh(&mut self, force: bool, fetch_tx: &mpsc::Sender<FetchOutcome>) {
        let requests = self.app.plan_refresh(force);
        if !requests.is_empty() {
            info!("Refreshing {} snapshots", requests.len());
        }
        for request in requests {
            let providers = self.providers.clone();
            let tx = fetch_tx.clone();
            tokio::spawn(async move {
                let outcome = providers.fetch(request).await;
                // Closed only after the loop has exited.
                let _ = tx.send(outcome).await;
            });
        }
    }

    fn handle_key_input(&mut self, key: KeyEvent, fetch_tx: &mpsc::Sender<FetchOutcome>) {
        if self.input.is_some() {
            self.handle_alert_input(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Char('v') => self.switch_view(DashboardView::Prices),
            KeyCode::Char('w') => self.switch_view(DashboardView::Weather),
            KeyCode::Char('n') => self.switch_view(DashboardView::News),
            KeyCode::Char('a') => self.switch_view(DashboardView::Alerts),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                let last = self.row_count().saturating_sub(1);
                self.selected = (self.selected + 1).min(last);
            }
            KeyCode::Char('r') => {
                self.status_line = Some("Refreshing...".to_string());
                self.spawn_refresh(true, fetch_tx);
            }
            KeyCode::Char('f') => self.toggle_favorite(),
            KeyCode::Char('+') => self.start_alert_input(AlertDirection::Above),
            KeyCode::Char('-') => self.start_alert_input(AlertDirection::Below),
            KeyCode::Char('x') if self.current_view == DashboardView::Alerts => {
                let id = self.app.alerts().rules().get(self.selected).map(|rule| rule.id);
                if let Some(id) = id {
                    self.app.remove_alert(id);
                    self.selected = self.selected.min(self.row_count().saturating_sub(1));
                    self.status_line = Some("Alert removed".to_string());
                }
            }
            KeyCode::Left => self.notification_cursor = self.notification_cursor.saturating_sub(1),
            KeyCode::Right => {
                let last = self.app.notifications().len().saturating_sub(1);
                self.notification_cursor = (self.notification_cursor + 1).min(last);
            }
            KeyCode::Char('d') => self.dismiss_selected_notification(),
            KeyCode::Char('c') => {
                self.app.clear_notifications();
                self.notification_cursor = 0;
            }
            _ => (),
        }
    }

    fn dismiss_selected_notification(&mut self) {
        let id = self
            .app
            .notifications()
            .list()
            .nth(self.notification_cursor)
            .map(|event| event.id);
        if let Some(id) = id {
            self.app.dismiss(id);
        }
        let last = self.app.notifications().len().saturating_sub(1);
        self.notification_cursor = self.notification_cursor.min(last);
    }

    fn handle_alert_input(&mut self, key: KeyEvent) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => input.buffer.push(c),
            KeyCode::Backspace => {
                input.buffer.pop();
            }
            KeyCode::Tab => input.direction = input.direction.toggle(),
            KeyCode::Esc => self.input = None,
            KeyCode::Enter => {
                let input = input.clone();
                match self
                    .app
                    .create_alert(&input.subject, input.kind, &input.buffer, input.direction)
                {
                    Ok(_) => {
                        self.status_line = Some(format!(
                            "Alert set: {} {} {}",
                            input.subject,
                            input.direction.as_str(),
                            input.buffer
                        ));
                        self.input = None;
                    }
                    Err(e) => self.status_line = Some(e.to_string()),
                }
            }
            _ => (),
        }
    }

    fn switch_view(&mut self, view: DashboardView) {
        self.current_view = view;
        self.selected = 0;
    }

    fn row_count(&self) -> usize {
        match self.current_view {
            DashboardView::Prices => self.app.coin_order().len(),
            DashboardView::Weather => self.app.city_order().len(),
            DashboardView::News => self.app.news().value.map_or(0, |bundle| bundle.articles.len()),
            DashboardView::Alerts => self.app.alerts().len(),
        }
    }

    fn selected_subject(&self) -> Option<(String, SubjectKind)> {
        match self.current_view {
            DashboardView::Prices => self
                .app
                .coin_order()
                .get(self.selected)
                .map(|id| (id.clone(), SubjectKind::Coin)),
            DashboardView::Weather => self
                .app
                .city_order()
                .get(self.selected)
                .map(|city| (city.clone(), SubjectKind::City)),
            DashboardView::News | DashboardView::Alerts => None,
        }
    }

    fn toggle_favorite(&mut self) {
        let Some((subject, kind)) = self.selected_subject() else {
            return;
        };
        let favorite = match kind {
            SubjectKind::Coin => self.app.toggle_favorite_coin(&subject),
            SubjectKind::City => self.app.toggle_favorite_city(&subject),
        };
        self.status_line = Some(if favorite {
            format!("{} added to favorites", subject)
        } else {
            format!("{} removed from favorites", subject)
        });
    }

    fn start_alert_input(&mut self, direction: AlertDirection) {
        if let Some((subject, kind)) = self.selected_subject() {
            self.status_line = None;
            self.input = Some(AlertInput {
                subject,
                kind,
                direction,
                buffer: String::new(),
            });
        }
    }

    fn render(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(7),
                Constraint::Length(3),
            ])
            .split(f.size());

        self.render_header(f, chunks[0]);
        self.render_main_content(f, chunks[1]);
        self.render_notifications(f, chunks[2]);
        self.render_footer(f, chunks[3]);
    }

    fn render_header(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let state = self.app.connection();
        let color = match state {
            ConnectionState::Connected => Color::Green,
            ConnectionState::Connecting => Color::Yellow,
            ConnectionState::Disconnected => Color::Red,
        };

        let header = Paragraph::new(Text::from(vec![
            Line::from(vec![
                Span::styled(
                    "CRYPTOWEATHER ",
                    Style::default()
                        .fg(Color::LightCyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(state.as_str(), Style::default().fg(color)),
            ]),
            Line::from(Span::styled(
                format!(
                    "Last update: {} | Refresh every {}s | Alerts: {} | Failing sources: {}",
                    Local::now().format("%H:%M:%S"),
                    self.app.preferences().refresh_interval.as_secs(),
                    self.app.alerts().len(),
                    self.app.failing_entries()
                ),
                Style::default().fg(Color::Gray),
            )),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));

        f.render_widget(header, area);
    }

    fn render_main_content(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        match self.current_view {
            DashboardView::Prices => self.render_prices_view(f, area),
            DashboardView::Weather => self.render_weather_view(f, area),
            DashboardView::News => self.render_news_view(f, area),
            DashboardView::Alerts => self.render_alerts_view(f, area),
        }
    }

    fn render_prices_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Crypto Prices");
        let inner_area = block.inner(area);
        f.render_widget(block, area);

        if inner_area.height < 3 || inner_area.width < 30 {
            return;
        }

        let rows = self.app.coin_order().into_iter().enumerate().map(|(i, id)| {
            let entry = self.app.coin(&id);
            let favorite = self.app.preferences().is_favorite_coin(&id);
            let (name, price, change, cap, volume, range) = match &entry.value {
                Some(coin) => {
                    let data = &coin.market_data;
                    let change = data.price_change_percentage_24h.unwrap_or(0.0);
                    let change_color = if change < 0.0 { Color::Red } else { Color::Green };
                    (
                        coin.label().unwrap_or_else(|| id.clone()),
                        data.current_price.usd.map_or("-".to_string(), format_usd),
                        Span::styled(format_change(change), Style::default().fg(change_color)),
                        data.market_cap.usd.map_or("-".to_string(), format_compact_usd),
                        data.total_volume.usd.map_or("-".to_string(), format_compact_usd),
                        match (data.low_24h.usd, data.high_24h.usd) {
                            (Some(low), Some(high)) => format!("{} - {}", format_usd(low), format_usd(high)),
                            _ => "-".to_string(),
                        },
                    )
                }
                None => (
                    id.clone(),
                    "-".to_string(),
                    Span::raw("-"),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ),
            };

            Row::new(vec![
                Cell::from(if favorite { "*" } else { " " }),
                Cell::from(name),
                Cell::from(price),
                Cell::from(change),
                Cell::from(cap),
                Cell::from(volume),
                Cell::from(range),
                Cell::from(status_span(&entry)),
            ])
            .style(row_style(i == self.selected))
        });

        let table = Table::new(rows)
            .header(
                Row::new(vec!["", "Coin", "Price", "24h", "Market Cap", "Volume", "24h Range", "Status"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .widths(&[
                Constraint::Length(1),
                Constraint::Length(12),
                Constraint::Length(14),
                Constraint::Length(9),
                Constraint::Length(11),
                Constraint::Length(11),
                Constraint::Length(25),
                Constraint::Min(10),
            ]);

        f.render_widget(table, inner_area);
    }

    fn render_weather_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Weather");
        let inner_area = block.inner(area);
        f.render_widget(block, area);

        if inner_area.height < 3 || inner_area.width < 30 {
            return;
        }

        let rows = self.app.city_order().into_iter().enumerate().map(|(i, city)| {
            let entry = self.app.city(&city);
            let favorite = self.app.preferences().is_favorite_city(&city);
            let cells = match &entry.value {
                Some(weather) => vec![
                    Cell::from(format!("{:.1}°C", weather.main.temp)),
                    Cell::from(format!("{:.1}°C", weather.main.feels_like)),
                    Cell::from(format!("{:.0}%", weather.main.humidity)),
                    Cell::from(format!("{:.1} m/s", weather.wind.speed)),
                    Cell::from(weather.summary().to_string()),
                ],
                None => vec![Cell::from("-"); 5],
            };

            let mut row = vec![Cell::from(if favorite { "*" } else { " " }), Cell::from(city.clone())];
            row.extend(cells);
            row.push(Cell::from(status_span(&entry)));
            Row::new(row).style(row_style(i == self.selected))
        });

        let table = Table::new(rows)
            .header(
                Row::new(vec!["", "City", "Temp", "Feels", "Humidity", "Wind", "Conditions", "Status"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .widths(&[
                Constraint::Length(1),
                Constraint::Length(14),
                Constraint::Length(8),
                Constraint::Length(8),
                Constraint::Length(9),
                Constraint::Length(9),
                Constraint::Length(18),
                Constraint::Min(10),
            ]);

        f.render_widget(table, inner_area);
    }

    fn render_news_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let entry = self.app.news();
        let block = Block::default().borders(Borders::ALL).title("Crypto News");

        let mut lines = Vec::new();
        if let Some(message) = &entry.error_message {
            lines.push(Line::from(Span::styled(
                message.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        match &entry.value {
            Some(bundle) if bundle.articles.is_empty() => lines.push(Line::from("No headlines right now")),
            Some(bundle) => {
                for (i, article) in bundle.articles.iter().enumerate() {
                    lines.push(Line::from(Span::styled(
                        truncate(&article.title, 100),
                        row_style(i == self.selected).add_modifier(Modifier::BOLD),
                    )));
                    if let Some(description) = &article.description {
                        lines.push(Line::from(truncate(description, 160)));
                    }
                    lines.push(Line::from(Span::styled(
                        format!("{} | {} | {}", article.source_id, article.pub_date, article.link),
                        Style::default().fg(Color::Gray),
                    )));
                    lines.push(Line::from(""));
                }
            }
            None if entry.status == CacheStatus::Error => {}
            None => lines.push(Line::from("Loading headlines...")),
        }

        let news = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(news, area);
    }

    fn render_alerts_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Alerts");
        let inner_area = block.inner(area);
        f.render_widget(block, area);

        if inner_area.height < 3 || inner_area.width < 30 {
            return;
        }

        let rows = self.app.alerts().rules().iter().enumerate().map(|(i, rule)| {
            let (condition, current) = match rule.subject_kind {
                SubjectKind::Coin => (
                    format!("{} {}", rule.direction.as_str(), format_usd(rule.threshold)),
                    self.app
                        .coin(&rule.subject_key)
                        .value
                        .and_then(|coin| coin.primary_value())
                        .map_or("-".to_string(), format_usd),
                ),
                SubjectKind::City => (
                    format!("{} {:.1}°C", rule.direction.as_str(), rule.threshold),
                    self.app
                        .city(&rule.subject_key)
                        .value
                        .map_or("-".to_string(), |weather| format!("{:.1}°C", weather.main.temp)),
                ),
            };

            let status = if rule.triggered {
                Span::styled("TRIGGERED", Style::default().fg(Color::Green))
            } else {
                Span::styled("PENDING", Style::default().fg(Color::Yellow))
            };

            Row::new(vec![
                Cell::from(rule.subject_key.clone()),
                Cell::from(condition),
                Cell::from(current),
                Cell::from(status),
                Cell::from(rule.created_at.with_timezone(&Local).format("%H:%M:%S").to_string()),
            ])
            .style(row_style(i == self.selected))
        });

        let table = Table::new(rows)
            .header(
                Row::new(vec!["Subject", "Condition", "Current", "Status", "Created"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .widths(&[
                Constraint::Length(14),
                Constraint::Length(20),
                Constraint::Length(15),
                Constraint::Length(12),
                Constraint::Length(10),
            ]);

        f.render_widget(table, inner_area);
    }

    fn render_notifications(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let queue = self.app.notifications();
        let visible = (area.height.saturating_sub(2) as usize).max(1);
        let cursor = self.notification_cursor.min(queue.len().saturating_sub(1));
        // Keep the selected line on screen.
        let offset = cursor.saturating_sub(visible - 1);
        let lines: Vec<Line> = queue
            .list()
            .enumerate()
            .skip(offset)
            .take(visible)
            .map(|(i, event)| {
                let selected = i == cursor;
                Line::from(vec![
                    Span::styled(
                        format!("{} ", event.timestamp.with_timezone(&Local).format("%H:%M:%S")),
                        if selected { row_style(true) } else { Style::default().fg(Color::Gray) },
                    ),
                    Span::styled(event.message.clone(), row_style(selected)),
                ])
            })
            .collect();

        let panel = Paragraph::new(Text::from(lines)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Notifications ({})", queue.len())),
        );
        f.render_widget(panel, area);
    }

    fn render_footer(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let key = |k: &'static str| Span::styled(k, Style::default().add_modifier(Modifier::BOLD));

        let mut controls = match &self.input {
            Some(input) => vec![
                Span::styled(
                    format!("Alert {} {}: {}_  ", input.subject, input.direction.as_str(), input.buffer),
                    Style::default().fg(Color::Yellow),
                ),
                key("Tab"),
                Span::raw(" Direction  "),
                key("Enter"),
                Span::raw(" Save  "),
                key("Esc"),
                Span::raw(" Cancel"),
            ],
            None => {
                let mut controls = vec![
                    Span::raw("Controls: "),
                    key("v/w/n/a"),
                    Span::raw(" Views  "),
                    key("↑/↓"),
                    Span::raw(" Navigate  "),
                ];
                match self.current_view {
                    DashboardView::Prices | DashboardView::Weather => controls.extend([
                        key("+/-"),
                        Span::raw(" Alert above/below  "),
                        key("f"),
                        Span::raw(" Favorite  "),
                    ]),
                    DashboardView::Alerts => controls.extend([key("x"), Span::raw(" Remove  ")]),
                    DashboardView::News => {}
                }
                controls.extend([
                    key("←/→"),
                    Span::raw(" Pick notification  "),
                    key("d"),
                    Span::raw(" Dismiss  "),
                    key("c"),
                    Span::raw(" Clear  "),
                    key("r"),
                    Span::raw(" Refresh  "),
                    key("q"),
                    Span::raw(" Quit"),
                ]);
                controls
            }
        };
        if let Some(status) = &self.status_line {
            controls.push(Span::styled(format!("  | {}", status), Style::default().fg(Color::Cyan)));
        }

        let footer = Paragraph::new(Line::from(controls))
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::TOP));

        f.render_widget(footer, area);
    }
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn status_span<V>(entry: &CacheEntry<String, V>) -> Span<'static> {
    match (entry.status, &entry.error_message) {
        (CacheStatus::Ready, Some(message)) => Span::styled(
            format!("STALE: {}", truncate(message, 40)),
            Style::default().fg(Color::Yellow),
        ),
        (CacheStatus::Ready, None) if entry.in_flight => {
            Span::styled("REFRESHING", Style::default().fg(Color::Gray))
        }
        (CacheStatus::Ready, None) => Span::styled("OK", Style::default().fg(Color::Green)),
        (CacheStatus::Loading, _) => Span::styled("LOADING", Style::default().fg(Color::Gray)),
        (CacheStatus::Idle, _) => Span::styled("WAITING", Style::default().fg(Color::Gray)),
        (CacheStatus::Error, message) => Span::styled(
            format!("ERROR: {}", truncate(message.as_deref().unwrap_or("unknown"), 40)),
            Style::default().fg(Color::Red),
        ),
    }
}
