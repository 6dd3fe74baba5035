//! App: terminal event loop for the dashboard.
//!
//! The two sync loops run on their own; the app only subscribes to their
//! snapshots, redraws on change, and forwards the retry key.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, info};

use counter_dash::stats_poller::{StatsPoller, StatsSnapshot};
use counter_dash::stream_monitor::{StreamMonitor, StreamSnapshot, StreamStatus};

use crate::ui;

pub struct App {
    poller: Arc<StatsPoller>,
    monitor: Arc<StreamMonitor>,
    stats: StatsSnapshot,
    stream: StreamSnapshot,
    report_url: String,
    stats_interval_secs: u64,
    should_quit: bool,
}

impl App {
    pub fn new(
        poller: Arc<StatsPoller>,
        monitor: Arc<StreamMonitor>,
        report_url: String,
        stats_interval_secs: u64,
    ) -> Self {
        let stats = poller.snapshot();
        let stream = monitor.snapshot();
        Self {
            poller,
            monitor,
            stats,
            stream,
            report_url,
            stats_interval_secs,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let result = self.event_loop(&mut terminal).await;

        // ── Teardown ──────────────────────────────────────────────────────────
        self.poller.deactivate();
        self.monitor.deactivate();
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        info!("dashboard closed");

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> anyhow::Result<()> {
        // Keyboard reader.  Polls with a timeout so it notices the app is gone.
        let (tx, mut rx) = mpsc::channel::<Event>(64);
        tokio::task::spawn_blocking(move || loop {
            if tx.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(200)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.blocking_send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        });

        let mut stats_rx = self.poller.subscribe();
        let mut stream_rx = self.monitor.subscribe();

        // Keeps the "updated Ns ago" label moving.
        let mut clock = tokio::time::interval(Duration::from_secs(1));
        clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                let view = ui::View {
                    stats: &self.stats,
                    stream: &self.stream,
                    report_url: &self.report_url,
                    stats_interval_secs: self.stats_interval_secs,
                };
                terminal.draw(|f| ui::draw(f, &view))?;
            }
            needs_redraw = true;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(ev) = rx.recv() => {
                    match ev {
                        Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                        Event::Resize(..) => {}
                        _ => needs_redraw = false,
                    }
                }
                Ok(()) = stats_rx.changed() => {
                    self.stats = stats_rx.borrow_and_update().clone();
                }
                Ok(()) = stream_rx.changed() => {
                    self.stream = stream_rx.borrow_and_update().clone();
                }
                _ = clock.tick() => {}
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Char('r') => {
                if matches!(self.stream.status, StreamStatus::Error(_)) {
                    self.monitor.retry();
                    self.stream = self.monitor.snapshot();
                }
            }
            _ => {}
        }
    }
}
