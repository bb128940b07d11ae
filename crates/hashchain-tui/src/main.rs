//! Terminal UI for the hash chain.
use std::{
    io,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hashchain_core::{
    constants::{DEFAULT_EXPORT_FILE, MAX_DIFFICULTY, SHELL_DIFFICULTY},
    hash::{leading_zero_chars, sha256_hex},
    Block as ChainBlock, BlockCheck, Chain, ChainConfig, ChainError, PendingAppend, SearchHit,
    SharedChain, ValidationReport,
};
use ratatui::{
    layout::{Constraint, Direction, Flex, Layout, Rect},
    prelude::*,
    widgets::*,
    Frame,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug, Clone)]
struct Args {
    /// Leading zero hex characters required of each new block hash
    /// [default: 3, or the loaded chain's difficulty with --load]
    #[arg(short, long)]
    difficulty: Option<u32>,

    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,

    /// Start from a saved chain instead of a fresh genesis block
    #[arg(long)]
    load: Option<PathBuf>,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    #[default]
    Chain,
    Mine,
    Search,
    Integrity,
    Save,
    HashDemo,
}

impl Tab {
    const ALL: [Tab; 6] = [
        Tab::Chain,
        Tab::Mine,
        Tab::Search,
        Tab::Integrity,
        Tab::Save,
        Tab::HashDemo,
    ];

    fn title(self) -> &'static str {
        match self {
            Tab::Chain => "Chain",
            Tab::Mine => "Mine",
            Tab::Search => "Search",
            Tab::Integrity => "Integrity",
            Tab::Save => "Save/Load",
            Tab::HashDemo => "HashDemo",
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self as usize + 1) % Self::ALL.len()]
    }

    fn previous(self) -> Self {
        Self::ALL[(self as usize + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

struct App {
    chain: SharedChain,
    tab: Tab,
    // cached copy of the chain, refreshed whenever no append is in flight
    rows: Vec<ChainBlock>,
    difficulty: u32,
    chain_state: TableState,
    chain_popup: bool,
    chain_status: Option<String>,
    // mining
    mine_data: String,
    mine_status: Option<String>,
    mining: Option<PendingAppend>,
    mining_started: Instant,
    // search
    search_input: String,
    search_hits: Vec<SearchHit>,
    // integrity
    report: Option<ValidationReport>,
    // save / load
    file_path: String,
    file_status: Option<String>,
    // hash demo
    hash_input: String,
    hash_output: String,
    hash_leading_zeros: u32,
}

impl App {
    async fn new(chain: SharedChain) -> Self {
        let mut app = Self {
            chain,
            tab: Tab::Chain,
            rows: Vec::new(),
            difficulty: 0,
            chain_state: TableState::default(),
            chain_popup: false,
            chain_status: None,
            mine_data: String::new(),
            mine_status: None,
            mining: None,
            mining_started: Instant::now(),
            search_input: String::new(),
            search_hits: Vec::new(),
            report: None,
            file_path: DEFAULT_EXPORT_FILE.to_string(),
            file_status: None,
            hash_input: String::new(),
            hash_output: String::new(),
            hash_leading_zeros: 0,
        };
        app.refresh().await;
        app.update_hash_demo();
        app
    }

    fn is_mining(&self) -> bool {
        self.mining.is_some()
    }

    /// Reads would queue behind an in-flight append, so the cache is only
    /// refreshed while idle.
    async fn refresh(&mut self) {
        if self.is_mining() {
            return;
        }
        self.rows = self.chain.blocks().await;
        self.difficulty = self.chain.difficulty().await;
        match self.chain_state.selected() {
            Some(i) if i >= self.rows.len() => self.chain_state.select(Some(self.rows.len() - 1)),
            None if !self.rows.is_empty() => self.chain_state.select(Some(0)),
            _ => {}
        }
    }

    fn next_row(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.chain_state.selected() {
            Some(i) if i + 1 < self.rows.len() => i + 1,
            _ => 0,
        };
        self.chain_state.select(Some(i));
    }

    fn previous_row(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.chain_state.selected() {
            Some(0) | None => self.rows.len() - 1,
            Some(i) => i - 1,
        };
        self.chain_state.select(Some(i));
    }

    fn start_mining(&mut self) {
        if self.is_mining() {
            self.mine_status = Some("A block is already being mined.".into());
            return;
        }
        if self.mine_data.trim().is_empty() {
            self.mine_status = Some("Please enter data before mining.".into());
            return;
        }
        let data = std::mem::take(&mut self.mine_data);
        self.mining = Some(self.chain.append(data));
        self.mining_started = Instant::now();
        self.mine_status = Some(format!(
            "⛏ Mining at difficulty {}... (Esc to cancel)",
            self.difficulty
        ));
    }

    fn cancel_mining(&mut self) {
        if let Some(pending) = &self.mining {
            pending.cancel();
            self.mine_status = Some("Cancelling...".into());
        }
    }

    /// Collects a finished append, if any.
    async fn poll_mining(&mut self) {
        if !self.mining.as_ref().is_some_and(PendingAppend::is_finished) {
            return;
        }
        let Some(pending) = self.mining.take() else {
            return;
        };
        self.mine_status = Some(match pending.await {
            Ok(block) => format!(
                "✅ Mined index={} nonce={} hash={} in {:.4}s",
                block.header.index,
                block.header.nonce,
                block.hash_hex(),
                block.mining_time.unwrap_or_default()
            ),
            Err(ChainError::Cancelled) => "❌ Mining cancelled; chain unchanged.".into(),
            Err(e) => format!("❌ Mining failed: {e}"),
        });
        self.report = None;
        self.refresh().await;
    }

    async fn adjust_difficulty(&mut self, up: bool) {
        if self.is_mining() {
            return;
        }
        let target = if up {
            (self.difficulty + 1).min(MAX_DIFFICULTY)
        } else {
            self.difficulty.saturating_sub(1)
        };
        if let Err(e) = self.chain.set_difficulty(target).await {
            self.mine_status = Some(format!("❌ {e}"));
        }
        self.refresh().await;
    }

    async fn tamper_selected(&mut self) {
        if self.is_mining() {
            self.chain_status = Some("Busy mining; try again when it finishes.".into());
            return;
        }
        let Some(index) = self.chain_state.selected() else {
            return;
        };
        self.chain_status = Some(match self.chain.tamper(index).await {
            Ok(()) => format!("Block {index} has been modified for testing purposes."),
            Err(ChainError::InvalidTamperTarget { .. }) => {
                "Genesis block cannot be tampered.".into()
            }
            Err(e) => format!("Tamper failed: {e}"),
        });
        self.report = None;
        self.refresh().await;
    }

    async fn run_search(&mut self) {
        if self.is_mining() {
            return;
        }
        self.search_hits = if self.search_input.is_empty() {
            Vec::new()
        } else {
            self.chain.search(&self.search_input).await
        };
    }

    async fn validate(&mut self) {
        if self.is_mining() {
            return;
        }
        self.report = Some(self.chain.validate().await);
    }

    async fn save(&mut self) {
        if self.is_mining() {
            self.file_status = Some("Busy mining; try again when it finishes.".into());
            return;
        }
        let path = self.file_path.trim().to_string();
        self.file_status = Some(match self.chain.export_to_path(&path).await {
            Ok(()) => format!("Blockchain saved as '{path}'."),
            Err(e) => format!("Could not save '{path}': {e}"),
        });
    }

    async fn load(&mut self) {
        if self.is_mining() {
            self.file_status = Some("Busy mining; try again when it finishes.".into());
            return;
        }
        let path = self.file_path.trim().to_string();
        self.file_status = Some(match Chain::import_from_path(&path) {
            Ok(chain) => {
                let len = chain.len();
                self.chain.replace(chain).await;
                format!("Loaded {len} blocks from '{path}'.")
            }
            Err(e) => format!("Could not load '{path}': {e}"),
        });
        self.report = None;
        self.chain_state.select(Some(0));
        self.refresh().await;
    }

    fn update_hash_demo(&mut self) {
        self.hash_output = sha256_hex(self.hash_input.as_bytes());
        self.hash_leading_zeros = leading_zero_chars(&self.hash_output);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr and only when RUST_LOG is set
    if std::env::var_os("RUST_LOG").is_some() {
        fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    }

    let args = Args::parse();
    let chain = build_chain(&args)?;
    tracing::debug!(blocks = chain.len(), difficulty = chain.difficulty(), "starting tui");
    let mut app = App::new(SharedChain::new(chain)).await;

    // terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // restore
    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// A fresh chain, or a loaded one with any explicit flags applied to the
/// blocks mined from now on.
fn build_chain(args: &Args) -> Result<Chain> {
    let config = ChainConfig::with_difficulty(args.difficulty.unwrap_or(SHELL_DIFFICULTY))
        .parallel(args.parallel);
    let chain = match &args.load {
        Some(path) => {
            let mut chain = Chain::import_from_path(path)?;
            if let Some(difficulty) = args.difficulty {
                chain.set_difficulty(difficulty)?;
            }
            chain.set_strategy(config.strategy);
            chain
        }
        None => Chain::with_config(config)?,
    };
    Ok(chain)
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(app, key).await? {
                    break;
                }
            }
        }

        app.poll_mining().await;
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.cancel_mining();
            return Ok(true);
        }
        KeyCode::Esc => {
            if app.is_mining() {
                app.cancel_mining();
            } else if app.chain_popup {
                app.chain_popup = false;
            } else {
                return Ok(true);
            }
        }
        KeyCode::Tab => app.tab = app.tab.next(),
        KeyCode::BackTab => app.tab = app.tab.previous(),
        _ => match app.tab {
            Tab::Chain => match key.code {
                KeyCode::Down => app.next_row(),
                KeyCode::Up => app.previous_row(),
                KeyCode::Char('p') | KeyCode::Enter => app.chain_popup = !app.chain_popup,
                KeyCode::Char('t') => app.tamper_selected().await,
                KeyCode::Char('r') => app.refresh().await,
                _ => {}
            },
            Tab::Mine => match key.code {
                KeyCode::Left => app.adjust_difficulty(false).await,
                KeyCode::Right => app.adjust_difficulty(true).await,
                KeyCode::Char(c) if !c.is_control() => app.mine_data.push(c),
                KeyCode::Backspace => {
                    app.mine_data.pop();
                }
                KeyCode::Enter => app.start_mining(),
                _ => {}
            },
            Tab::Search => match key.code {
                KeyCode::Char(c) if !c.is_control() => {
                    app.search_input.push(c);
                    app.run_search().await;
                }
                KeyCode::Backspace => {
                    app.search_input.pop();
                    app.run_search().await;
                }
                _ => {}
            },
            Tab::Integrity => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Char('v')) {
                    app.validate().await;
                }
            }
            Tab::Save => match key.code {
                KeyCode::Char('o') if ctrl => app.load().await,
                KeyCode::Char(c) if !c.is_control() => app.file_path.push(c),
                KeyCode::Backspace => {
                    app.file_path.pop();
                }
                KeyCode::Enter => app.save().await,
                _ => {}
            },
            Tab::HashDemo => match key.code {
                KeyCode::Char(c) if !c.is_control() => {
                    app.hash_input.push(c);
                    app.update_hash_demo();
                }
                KeyCode::Backspace => {
                    app.hash_input.pop();
                    app.update_hash_demo();
                }
                _ => {}
            },
        },
    }
    Ok(false)
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(size);

    // Tabs
    let titles = Tab::ALL
        .iter()
        .map(|t| Line::from(t.title()))
        .collect::<Vec<_>>();
    let title = if app.is_mining() {
        format!("hashchain-tui • mining for {:.1}s", app.mining_started.elapsed().as_secs_f64())
    } else {
        format!("hashchain-tui • {} blocks • difficulty {}", app.rows.len(), app.difficulty)
    };
    let tabs = Tabs::new(titles)
        .select(app.tab as usize)
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(Style::default().fg(Color::Green))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    // Main area
    match app.tab {
        Tab::Chain => render_chain(f, chunks[1], app),
        Tab::Mine => render_mine(f, chunks[1], app),
        Tab::Search => render_search(f, chunks[1], app),
        Tab::Integrity => render_integrity(f, chunks[1], app),
        Tab::Save => render_save(f, chunks[1], app),
        Tab::HashDemo => render_hashdemo(f, chunks[1], app),
    }

    // Footer
    let help = Paragraph::new(
        "ESC quit/cancel mining • TAB next tab • Chain: ↑/↓ select, p details, t tamper • Mine: ←/→ difficulty, Enter mine • Integrity: Enter validate • Save: Enter save, Ctrl-O load")
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL).title("help"));
    f.render_widget(help, chunks[2]);
}

fn block_lines(b: &ChainBlock) -> Vec<String> {
    vec![
        format!(" Index       : {}", b.header.index),
        format!(" Timestamp   : {}", b.header.timestamp),
        format!(" Nonce       : {}", b.header.nonce),
        format!(" Prev hash   : {}", b.header.previous_hash),
        format!(" Hash        : {}", b.hash_hex()),
        format!(" Difficulty  : {}", b.header.difficulty),
        format!(" Data        : {}", b.data),
        match b.mining_time {
            Some(secs) => format!(" Mining time : {secs} seconds"),
            None => " Mining time : N/A".to_string(),
        },
    ]
}

fn render_chain(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let rows = app.rows.iter().map(|b| {
        Row::new(vec![
            Cell::from(b.header.index.to_string()),
            Cell::from(b.header.timestamp.clone()),
            Cell::from(b.header.nonce.to_string()),
            Cell::from(b.header.difficulty.to_string()),
            Cell::from(b.hash_hex().to_string()),
            Cell::from(b.data.to_string()),
        ])
    });
    let table = Table::new(
        rows,
        vec![
            Constraint::Length(6),
            Constraint::Length(27),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(66),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["idx", "timestamp", "nonce", "diff", "hash", "data"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(Block::default().borders(Borders::ALL).title("Chain blocks"));
    f.render_stateful_widget(table, chunks[0], &mut app.chain_state);

    let status = Paragraph::new(app.chain_status.clone().unwrap_or_default())
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[1]);

    if app.chain_popup {
        let popup = Block::bordered()
            .style(Style::default().bg(Color::Black).fg(Color::Yellow))
            .title("Block details")
            .title_style(Style::new().yellow().bold())
            .border_style(Style::new().red().bold());
        let items = match app.chain_state.selected().and_then(|i| app.rows.get(i)) {
            Some(b) => block_lines(b),
            None => vec!["No block selected".to_string()],
        };
        let list = List::new(items).block(popup.clone());
        let popup_area = centered_area(area, 80, 40);
        // clears out any background in the area before rendering the popup
        f.render_widget(Clear, popup_area);
        f.render_widget(popup, popup_area);
        f.render_widget(list, popup_area);
    }
}

fn render_mine(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(area);

    let top = Paragraph::new(format!(
        "Difficulty: {} leading zero hex chars   (←/→ to adjust)",
        app.difficulty
    ))
    .block(Block::default().borders(Borders::ALL).title("Target"));
    f.render_widget(top, chunks[0]);

    let data = Paragraph::new(app.mine_data.clone())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Block data (type, Backspace, Enter to mine)"),
        );
    f.render_widget(data, chunks[1]);

    let status = Paragraph::new(app.mine_status.clone().unwrap_or_default())
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[2]);
}

fn render_search(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let input = Paragraph::new(app.search_input.clone())
        .block(Block::default().borders(Borders::ALL).title("Keyword"));
    f.render_widget(input, chunks[0]);

    let items: Vec<String> = if app.search_input.is_empty() {
        vec!["Type to search block data.".to_string()]
    } else if app.is_mining() {
        vec!["Search is paused while a block is being mined.".to_string()]
    } else if app.search_hits.is_empty() {
        vec!["Keyword not found in any block.".to_string()]
    } else {
        app.search_hits
            .iter()
            .map(|h| format!("Found in Block {}: {}", h.index, h.data))
            .collect()
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Matches"));
    f.render_widget(list, chunks[1]);
}

fn render_integrity(f: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = match &app.report {
        None => vec![Line::from("Press Enter to check chain integrity.")],
        Some(report) => {
            let mut lines: Vec<Line> = report
                .verdicts
                .iter()
                .map(|v| {
                    let color = match v.check {
                        BlockCheck::Valid => Color::Green,
                        _ => Color::Red,
                    };
                    Line::styled(v.to_string(), Style::default().fg(color))
                })
                .collect();
            lines.push(if report.is_valid() {
                Line::styled("Blockchain is valid.", Style::default().fg(Color::Green).bold())
            } else {
                Line::styled(
                    "Blockchain integrity is broken.",
                    Style::default().fg(Color::Red).bold(),
                )
            });
            lines
        }
    };
    let body = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Integrity check"));
    f.render_widget(body, area);
}

fn render_save(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let input = Paragraph::new(app.file_path.clone()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("File (Enter to save, Ctrl-O to load)"),
    );
    f.render_widget(input, chunks[0]);

    let status = Paragraph::new(app.file_status.clone().unwrap_or_default())
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[1]);
}

fn render_hashdemo(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Length(4),
            Constraint::Min(0),
        ])
        .split(area);

    let input = Paragraph::new(app.hash_input.clone())
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Input"));
    f.render_widget(input, chunks[0]);

    let out = Paragraph::new(format!(
        "sha256: {}\nleading zero hex chars: {}",
        app.hash_output, app.hash_leading_zeros
    ))
    .block(Block::default().borders(Borders::ALL).title("Output"));
    f.render_widget(out, chunks[1]);

    let help = Paragraph::new(
        "Type to update the hash. Each difficulty step needs one more leading zero, about 16x the work.",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[2]);
}

/// Create a centered rect using the given percentage of the available rect
fn centered_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
    let [area] = vertical.areas(area);

    let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
    let [area] = horizontal.areas(area);

    area
}
