//! App: component-based event loop for the dashboard.
//!
//! Architecture:
//! - `App` owns the [`SyncEngine`] (and through it the snapshot store), the
//!   components and the UI chrome (focus, prompt, confirm line, toasts).
//! - Terminal input comes from a blocking reader task; sync results come from
//!   [`SyncTasks`] and operator jobs.  One `select!` loop consumes both, so
//!   the store has a single writer.
//! - Components return `Vec<Action>`; App dispatches each Action.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use repost_proto::config::Settings;
use repost_proto::protocol::{ChannelRef, Config, PostConfig, Status};

use crate::{
    action::{Action, ComponentId, PromptKind},
    api::ApiClient,
    app_state::AppState,
    component::Component,
    components::{
        channel_list::ChannelList, header::Header, help_overlay::HelpOverlay, log_panel::LogPanel,
        post_config_panel::PostConfigPanel, progress_panel::ProgressPanel,
    },
    control::Command,
    engine::{spawn_job, Notice, SyncEngine, SyncMessage, SyncTasks},
    focus::FocusRing,
    store::{PollGate, SnapshotStore},
    theme::{C_BG, C_MODE_CONFIRM, C_PRIMARY},
    widgets::{
        prompt::{Prompt, PromptAction},
        status_bar::{self, InputMode},
        toast::ToastManager,
    },
};

const LOG_PANEL_HEIGHT: u16 = 12;
const PROGRESS_PANEL_HEIGHT: u16 = 5;

struct PendingConfirm {
    question: String,
    command: Command,
}

/// Where each pane was drawn last frame, for mouse hit-testing.
#[derive(Debug, Clone, Copy, Default)]
struct PaneAreas {
    progress: Rect,
    post_config: Rect,
    channels: Rect,
    logs: Rect,
}

pub struct App {
    settings: Settings,
    api: ApiClient,
    engine: SyncEngine,
    gate_rx: watch::Receiver<PollGate>,
    state: AppState,

    header: Header,
    progress: ProgressPanel,
    post_config: PostConfigPanel,
    channels: ChannelList,
    logs: LogPanel,
    help: HelpOverlay,

    focus: FocusRing,
    prompt: Prompt,
    confirm: Option<PendingConfirm>,
    toast: ToastManager,
    show_keys_bar: bool,
    pane_areas: PaneAreas,
    /// Operator jobs awaiting their outcome.
    in_flight: usize,

    sync_tx: Option<mpsc::Sender<SyncMessage>>,
    tasks: Option<SyncTasks>,
    should_quit: bool,
}

impl App {
    pub fn new(settings: Settings, api: ApiClient, store: SnapshotStore) -> Self {
        let (engine, gate_rx) = SyncEngine::new(store);
        let state = AppState::new(engine.snapshot().clone(), api.base_url());
        Self {
            settings,
            api,
            engine,
            gate_rx,
            state,
            header: Header::new(),
            progress: ProgressPanel::new(),
            post_config: PostConfigPanel::new(),
            channels: ChannelList::new(),
            logs: LogPanel::new(),
            help: HelpOverlay::new(),
            focus: FocusRing::new(vec![
                ComponentId::Progress,
                ComponentId::PostConfig,
                ComponentId::Channels,
                ComponentId::Logs,
            ]),
            prompt: Prompt::new(),
            confirm: None,
            toast: ToastManager::new(),
            show_keys_bar: true,
            pane_areas: PaneAreas::default(),
            in_flight: 0,
            sync_tx: None,
            tasks: None,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        // ── Background sync (stream, pollers, initial load) ───────────────────
        let (sync_tx, mut sync_rx) = mpsc::channel::<SyncMessage>(1024);
        self.tasks = Some(SyncTasks::spawn(
            self.api.clone(),
            &self.settings.sync,
            self.gate_rx.clone(),
            sync_tx.clone(),
        ));
        self.sync_tx = Some(sync_tx);
        info!("dashboard started against {}", self.api.base_url());

        // ── Background task: keyboard/mouse events ────────────────────────────
        // Polls with a timeout so the reader notices the loop has gone away.
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
        tokio::task::spawn_blocking(move || loop {
            if event_tx.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(200)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if event_tx.blocking_send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        });

        // Toast expiry + spinner animation
        let mut toast_tick = tokio::time::interval(Duration::from_millis(100));
        toast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(ev) = event_rx.recv() => {
                    self.handle_event(ev);
                    needs_redraw = true;
                }

                Some(msg) = sync_rx.recv() => {
                    const MAX_DRAIN: usize = 256;
                    self.on_sync(msg);
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        match sync_rx.try_recv() {
                            Ok(next) => self.on_sync(next),
                            Err(_) => break,
                        }
                        drained += 1;
                    }
                    self.refresh_state();
                    needs_redraw = true;
                }

                _ = toast_tick.tick() => {
                    self.toast.tick();
                    needs_redraw = true;
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        // Dropping the task guard cancels the stream, pollers and jobs.
        drop(self.tasks.take());
        drop(self.sync_tx.take());
        info!("dashboard stopped");

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        Ok(())
    }

    // ── Sync results ──────────────────────────────────────────────────────────

    fn on_sync(&mut self, msg: SyncMessage) {
        // Only operator-job outcomes come back with a notice.
        if let Some(notice) = self.engine.apply(msg) {
            self.in_flight = self.in_flight.saturating_sub(1);
            if self.in_flight == 0 {
                self.toast.dismiss_spinner();
            }
            self.toast.notice(&notice);
        }
    }

    fn refresh_state(&mut self) {
        self.state.snap = self.engine.snapshot().clone();
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn handle_event(&mut self, ev: Event) {
        let actions = match ev {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            _ => Vec::new(),
        };
        for action in actions {
            self.dispatch(action);
        }
        self.sync_input_mode();
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return vec![Action::Quit];
        }

        // y/n line captures the next key
        if let Some(pending) = self.confirm.take() {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    vec![Action::Run(pending.command)]
                }
                _ => vec![Action::Notify(Notice::info("Cancelled"))],
            };
        }

        if self.prompt.is_active() {
            return match self.prompt.handle_key(key) {
                PromptAction::Submitted(kind, text) => {
                    vec![prompt_action(kind, &text, &self.state.snap.config)]
                }
                PromptAction::Cancelled | PromptAction::None => vec![],
            };
        }

        if self.help.visible {
            return self.help.handle_key(key, &self.state);
        }

        // Global keys
        match key.code {
            KeyCode::Char('q') => return vec![Action::Quit],
            KeyCode::Char('?') => return vec![Action::ToggleHelp],
            KeyCode::Char('K') => return vec![Action::ToggleKeys],
            KeyCode::Tab => return vec![Action::FocusNext],
            KeyCode::BackTab => return vec![Action::FocusPrev],
            KeyCode::Char(c @ '1'..='4') => {
                self.focus.set_by_position(c as usize - '1' as usize);
                return vec![];
            }
            KeyCode::Char('s') => {
                let command = if self.state.snap.progress.status == Status::Running {
                    Command::Stop
                } else {
                    Command::Start
                };
                return vec![Action::Run(command)];
            }
            KeyCode::Char('p') => return vec![Action::Run(Command::PostNow)],
            KeyCode::Char('c') => {
                return vec![Action::Confirm {
                    question: "Clear every queued post?".to_string(),
                    command: Command::ClearQueue,
                }]
            }
            KeyCode::Char('x') => return vec![Action::Run(Command::Export)],
            KeyCode::Char('i') => {
                return vec![Action::Prompt {
                    kind: PromptKind::ImportPath,
                    initial: format!("{}/", self.settings.paths.backup_dir.display()),
                }]
            }
            KeyCode::Char('r') => return vec![Action::Run(Command::Reload)],
            _ => {}
        }

        let s = &self.state;
        match self.focus.current() {
            Some(ComponentId::Progress) => self.progress.handle_key(key, s),
            Some(ComponentId::PostConfig) => self.post_config.handle_key(key, s),
            Some(ComponentId::Channels) => self.channels.handle_key(key, s),
            Some(ComponentId::Logs) => self.logs.handle_key(key, s),
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Vec<Action> {
        if self.prompt.is_active() || self.confirm.is_some() || self.help.visible {
            return vec![];
        }
        let is_click = matches!(event.kind, MouseEventKind::Down(_));
        if !is_click && !matches!(event.kind, MouseEventKind::ScrollUp | MouseEventKind::ScrollDown) {
            return vec![];
        }

        fn hit(r: Rect, col: u16, row: u16) -> bool {
            r.width > 0
                && r.height > 0
                && col >= r.x
                && col < r.x + r.width
                && row >= r.y
                && row < r.y + r.height
        }

        let (col, row) = (event.column, event.row);
        let areas = self.pane_areas;
        let s = &self.state;
        let (id, mut actions) = if hit(areas.channels, col, row) {
            (ComponentId::Channels, self.channels.handle_mouse(event, areas.channels, s))
        } else if hit(areas.logs, col, row) {
            (ComponentId::Logs, self.logs.handle_mouse(event, areas.logs, s))
        } else if hit(areas.post_config, col, row) {
            (ComponentId::PostConfig, vec![])
        } else if hit(areas.progress, col, row) {
            (ComponentId::Progress, vec![])
        } else {
            return vec![];
        };

        if is_click && !self.focus.is_focused(id) {
            actions.insert(0, Action::FocusPane(id));
        }
        actions
    }

    fn sync_input_mode(&mut self) {
        self.state.input_mode = if self.confirm.is_some() {
            InputMode::Confirm
        } else if self.prompt.is_active() {
            InputMode::Prompt
        } else {
            InputMode::Normal
        };
    }

    // ── Action dispatcher ─────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action) {
        let secondary = self.help.on_action(&action, &self.state);
        self.apply_action(action);
        for a in secondary {
            self.apply_action(a);
        }
    }

    fn apply_action(&mut self, action: Action) {
        if !matches!(action, Action::Noop) {
            debug!("apply_action: {:?}", action);
        }
        match action {
            Action::FocusNext => {
                self.focus.next();
            }
            Action::FocusPrev => {
                self.focus.prev();
            }
            Action::FocusPane(id) => self.focus.set(id),
            Action::Run(command) => self.run_command(command),
            Action::Confirm { question, command } => {
                self.confirm = Some(PendingConfirm { question, command });
            }
            Action::Prompt { kind, initial } => self.prompt.open(kind, &initial),
            Action::Notify(notice) => self.toast.notice(&notice),
            // The overlay flips itself in on_action.
            Action::ToggleHelp => {}
            Action::ToggleKeys => self.show_keys_bar = !self.show_keys_bar,
            Action::Quit => self.should_quit = true,
            Action::Noop => {}
        }
    }

    /// Validate locally, then hand the job to a background task.
    fn run_command(&mut self, command: Command) {
        let (Some(tx), Some(tasks)) = (self.sync_tx.clone(), self.tasks.as_ref()) else {
            return;
        };
        let cancel = tasks.job_token();
        let job = match self.engine.prepare(command) {
            Ok(job) => job,
            Err(notice) => {
                self.toast.notice(&notice);
                self.refresh_state();
                return;
            }
        };

        self.toast.spinner(format!("{}…", job.kind().label()));
        self.in_flight += 1;
        spawn_job(
            self.api.clone(),
            job,
            self.settings.paths.backup_dir.clone(),
            self.settings.sync.clone(),
            tx,
            cancel,
        );
        // Selection edits are applied optimistically by `prepare`.
        self.refresh_state();
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

        let input_h = if self.prompt.is_active() || self.confirm.is_some() {
            1u16
        } else {
            0
        };
        let keys_h = if self.show_keys_bar { 1u16 } else { 0 };

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(LOG_PANEL_HEIGHT),
                Constraint::Length(input_h),
                Constraint::Length(keys_h),
            ])
            .split(area);

        self.header.draw(frame, outer[0], false, &self.state);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(outer[1]);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(PROGRESS_PANEL_HEIGHT), Constraint::Min(0)])
            .split(body[0]);

        self.pane_areas = PaneAreas {
            progress: left[0],
            post_config: left[1],
            channels: body[1],
            logs: outer[2],
        };

        let focus = &self.focus;
        self.progress.draw(
            frame,
            left[0],
            focus.is_focused(ComponentId::Progress),
            &self.state,
        );
        self.post_config.draw(
            frame,
            left[1],
            focus.is_focused(ComponentId::PostConfig),
            &self.state,
        );
        self.channels.draw(
            frame,
            body[1],
            focus.is_focused(ComponentId::Channels),
            &self.state,
        );
        self.logs.draw(
            frame,
            outer[2],
            focus.is_focused(ComponentId::Logs),
            &self.state,
        );

        if self.prompt.is_active() {
            self.prompt.draw(frame, outer[3]);
        } else if let Some(pending) = &self.confirm {
            draw_confirm(frame, outer[3], &pending.question);
        }

        if self.show_keys_bar {
            status_bar::draw_keys_bar(frame, outer[4], self.state.input_mode, self.focus.current());
        }

        self.help.draw(frame, area, false, &self.state);
        self.toast.draw(frame, area);
    }
}

fn draw_confirm(frame: &mut Frame, area: Rect, question: &str) {
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", question),
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "[y/n]",
            Style::default().fg(C_MODE_CONFIRM).add_modifier(Modifier::BOLD),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

// ── Prompt input → actions ────────────────────────────────────────────────────

/// `<id> [name...]`; the name falls back to the id.
pub fn parse_channel(text: &str) -> ChannelRef {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((id, name)) => ChannelRef::new(id, name),
        None => ChannelRef::new(text, ""),
    }
}

/// Seconds, with an optional `s`, `m` or `h` suffix.
pub fn parse_delay(text: &str) -> Option<u64> {
    let text = text.trim().to_ascii_lowercase();
    let (digits, unit) = match text.chars().last()? {
        's' => (&text[..text.len() - 1], 1),
        'm' => (&text[..text.len() - 1], 60),
        'h' => (&text[..text.len() - 1], 3600),
        _ => (text.as_str(), 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(unit)
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn not_a_delay(text: &str) -> Action {
    Action::Notify(Notice::warning(format!("Not a delay: {:?}", text.trim())))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(path).to_path_buf(),
    }
}

/// Turn submitted prompt text into the action it stands for.
pub fn prompt_action(kind: PromptKind, text: &str, config: &Config) -> Action {
    let pc = &config.post_config;
    let save = |post_config: PostConfig| Action::Run(Command::SavePostConfig(post_config));

    match kind {
        PromptKind::TemplateText => save(PostConfig {
            template_text: text.to_string(),
            ..pc.clone()
        }),
        PromptKind::ButtonLabel => save(PostConfig {
            button_label: optional(text),
            ..pc.clone()
        }),
        PromptKind::ButtonUrl => save(PostConfig {
            button_url: optional(text),
            ..pc.clone()
        }),
        PromptKind::DelayMin => match parse_delay(text) {
            Some(secs) => save(PostConfig {
                delay_min: secs,
                ..pc.clone()
            }),
            None => not_a_delay(text),
        },
        PromptKind::DelayMax => match parse_delay(text) {
            Some(secs) => save(PostConfig {
                delay_max: secs,
                ..pc.clone()
            }),
            None => not_a_delay(text),
        },
        PromptKind::StockChannel => Action::Run(Command::SetStockChannel(parse_channel(text))),
        PromptKind::AddDestination => Action::Run(Command::AddDestination(parse_channel(text))),
        PromptKind::RenameDestination(channel_id) => Action::Run(Command::RenameDestination {
            channel_id,
            channel: parse_channel(text),
        }),
        PromptKind::ImportPath => {
            let text = text.trim();
            if text.is_empty() {
                return Action::Noop;
            }
            let path = expand_home(text);
            Action::Confirm {
                question: format!("Import {} and replace the config?", path.display()),
                command: Command::Import(path),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            post_config: PostConfig {
                template_text: "old".into(),
                button_label: Some("Join".into()),
                delay_min: 60,
                delay_max: 600,
                ..PostConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn channel_input_splits_id_from_name() {
        assert_eq!(parse_channel("  -100 Daily News "), ChannelRef::new("-100", "Daily News"));
        assert_eq!(parse_channel("-200"), ChannelRef::new("-200", "-200"));
        assert_eq!(parse_channel("   ").channel_id, "");
    }

    #[test]
    fn delay_units() {
        assert_eq!(parse_delay("90"), Some(90));
        assert_eq!(parse_delay("90s"), Some(90));
        assert_eq!(parse_delay("15m"), Some(900));
        assert_eq!(parse_delay(" 2H "), Some(7200));
        assert_eq!(parse_delay("soon"), None);
        assert_eq!(parse_delay(""), None);
        assert_eq!(parse_delay("-5"), None);
    }

    #[test]
    fn delay_prompt_sends_whole_post_config() {
        match prompt_action(PromptKind::DelayMax, "20m", &config()) {
            Action::Run(Command::SavePostConfig(pc)) => {
                assert_eq!(pc.delay_max, 1200);
                assert_eq!(pc.delay_min, 60);
                assert_eq!(pc.template_text, "old");
                assert_eq!(pc.button_label.as_deref(), Some("Join"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn unparseable_delay_is_a_warning() {
        match prompt_action(PromptKind::DelayMin, "later", &config()) {
            Action::Notify(notice) => assert_eq!(notice.level, repost_proto::protocol::LogLevel::Warning),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn blank_button_label_clears_it() {
        match prompt_action(PromptKind::ButtonLabel, "  ", &config()) {
            Action::Run(Command::SavePostConfig(pc)) => assert_eq!(pc.button_label, None),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn rename_keeps_the_original_id() {
        match prompt_action(PromptKind::RenameDestination("-100".into()), "-101 Renamed", &config()) {
            Action::Run(Command::RenameDestination { channel_id, channel }) => {
                assert_eq!(channel_id, "-100");
                assert_eq!(channel, ChannelRef::new("-101", "Renamed"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn import_path_asks_for_confirmation() {
        match prompt_action(PromptKind::ImportPath, "/tmp/backup.json", &config()) {
            Action::Confirm { command, .. } => {
                assert_eq!(command, Command::Import(PathBuf::from("/tmp/backup.json")));
            }
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(matches!(
            prompt_action(PromptKind::ImportPath, " ", &config()),
            Action::Noop
        ));
    }
}
