//! Dashboard rendering.  Pure functions of the two snapshots.

use chrono::Local;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};
use ratatui::Frame;

use counter_dash::stats_poller::StatsSnapshot;
use counter_dash::stream_monitor::{StreamSnapshot, StreamStatus};

use crate::theme::*;

pub const EMPTY_ROWS: &str = "No data yet. Start the edge service to begin counting.";

pub struct View<'a> {
    pub stats: &'a StatsSnapshot,
    pub stream: &'a StreamSnapshot,
    pub report_url: &'a str,
    pub stats_interval_secs: u64,
}

pub fn draw(frame: &mut Frame, view: &View) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // identity
            Constraint::Length(1), // error
            Constraint::Length(4), // cards
            Constraint::Min(5),    // table
            Constraint::Length(6), // stream
            Constraint::Length(3), // export
            Constraint::Length(1), // keys
        ])
        .split(area);

    draw_title(frame, outer[0], view);
    draw_identity(frame, outer[1], view.stats);
    draw_error(frame, outer[2], view.stats);
    draw_cards(frame, outer[3], view.stats);
    draw_table(frame, outer[4], view);
    draw_stream(frame, outer[5], view.stream);
    draw_export(frame, outer[6], view.report_url);

    let keys = Line::from(vec![
        Span::styled(" r", style_title()),
        Span::styled(" retry stream  ", style_secondary()),
        Span::styled("q", style_title()),
        Span::styled(" quit", style_secondary()),
    ]);
    frame.render_widget(Paragraph::new(keys), outer[7]);
}

fn draw_title(frame: &mut Frame, area: Rect, view: &View) {
    let updated = match view.stats.last_success {
        Some(ts) => format!(
            "updated {}s ago",
            (Local::now() - ts).num_seconds().max(0)
        ),
        None => "waiting for first update".to_string(),
    };
    let line = Line::from(vec![
        Span::styled(" Dashboard ", style_title()),
        Span::styled(updated, style_muted()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_identity(frame: &mut Frame, area: Rect, stats: &StatsSnapshot) {
    let line = match &stats.identity {
        Some(me) => Line::from(vec![
            Span::styled(" Logged in as: ", style_secondary()),
            Span::styled(me.username.clone(), style_default()),
            Span::styled(format!(" ({})", me.role.label()), style_secondary()),
        ]),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_error(frame: &mut Frame, area: Rect, stats: &StatsSnapshot) {
    if let Some(err) = &stats.error {
        let line = Line::from(Span::styled(format!(" {}", err), style_error()));
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn draw_cards(frame: &mut Frame, area: Rect, stats: &StatsSnapshot) {
    let totals = stats.totals();
    let cards = [
        ("Date (today)", stats.day.format("%Y-%m-%d").to_string()),
        ("Total in", totals.total_in.to_string()),
        ("Total out", totals.total_out.to_string()),
        ("Unique (estimate)", totals.unique.to_string()),
    ];
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    for ((title, value), col) in cards.iter().zip(cols.iter()) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(style_border())
            .title(Span::styled(format!(" {} ", title), style_secondary()));
        let text = Paragraph::new(Line::from(Span::styled(value.clone(), style_card_value())))
            .block(block);
        frame.render_widget(text, *col);
    }
}

fn draw_table(frame: &mut Frame, area: Rect, view: &View) {
    let header = Row::new(["Camera ID", "Total In", "Total Out", "Unique"])
        .style(style_header_row());

    let rows: Vec<Row> = view
        .stats
        .rows
        .iter()
        .map(|r| {
            Row::new([
                Cell::from(r.camera_id.to_string()),
                Cell::from(r.total_in.to_string()),
                Cell::from(r.total_out.to_string()),
                Cell::from(r.unique_estimate.to_string()),
            ])
            .style(style_default())
        })
        .collect();

    let title = format!(
        " Summary (refreshes every {}s) ",
        view.stats_interval_secs
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Span::styled(title, style_secondary()));
    let inner = block.inner(area);

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(block);
    frame.render_widget(table, area);

    // Empty state spans all columns, so it goes under the header by hand.
    if view.stats.rows.is_empty() && inner.height > 1 {
        let below_header = Rect {
            y: inner.y + 1,
            height: 1,
            ..inner
        };
        frame.render_widget(
            Paragraph::new(Span::styled(EMPTY_ROWS, style_muted())),
            below_header,
        );
    }
}

fn draw_stream(frame: &mut Frame, area: Rect, stream: &StreamSnapshot) {
    let (badge, color, body) = match &stream.status {
        StreamStatus::Loading => (
            "LOADING",
            C_LOADING,
            vec![
                Line::from(Span::styled("Loading camera stream...", style_default())),
                Line::from(Span::styled("Connecting to edge server...", style_muted())),
            ],
        ),
        StreamStatus::Live => (
            "LIVE",
            C_LIVE,
            vec![Line::from(Span::styled(
                format!("{} frames received", stream.frames),
                style_default(),
            ))],
        ),
        StreamStatus::Error(msg) => (
            "ERROR",
            C_ERROR,
            vec![
                Line::from(Span::styled("Camera stream issue", style_error())),
                Line::from(Span::styled(msg.clone(), style_default())),
                Line::from(Span::styled("Press r to retry the stream.", style_secondary())),
            ],
        ),
    };

    let mut lines = body;
    lines.push(Line::from(Span::styled(stream.stream_url.clone(), style_muted())));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Line::from(vec![
            Span::styled(" Live camera feed ", style_secondary()),
            Span::styled(format!("[{}] ", badge), Style::default().fg(color)),
        ]));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_export(frame: &mut Frame, area: Rect, report_url: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Span::styled(" Export report (CSV) ", style_secondary()));
    let line = Line::from(Span::styled(format!("GET {}", report_url), style_code()));
    frame.render_widget(Paragraph::new(line).block(block), area);
}
