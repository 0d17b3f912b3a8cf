use {
    crate::{
        pipeline::MetricsFetcher,
        types::Product,
        ui::state::{Effect, Event, ViewState},
    },
    crossterm::event::{self as term_event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    ratatui::{backend::CrosstermBackend, Terminal},
    std::{
        io::Stdout,
        time::{Duration, Instant},
    },
    tokio::sync::mpsc,
};

/// Input poll interval, also the spinner frame rate
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct UiOptions {
    /// Deadline handed to each refresh
    pub refresh_timeout: Duration,
    /// Periodic refresh, `None` when disabled
    pub auto_refresh: Option<Duration>,
}

/// Map a key press to a view event
pub fn map_key(key: KeyEvent) -> Option<Event> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Event::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(Event::Quit),
        KeyCode::Char('r') => Some(Event::RefreshRequested),
        KeyCode::Char('s') => Some(Event::SortCycle),
        KeyCode::Up | KeyCode::Char('k') => Some(Event::MoveSelection(-1)),
        KeyCode::Down | KeyCode::Char('j') => Some(Event::MoveSelection(1)),
        _ => None,
    }
}

/// Run the TUI event loop
///
/// Owns the terminal and the only `ViewState`. Refreshes run as detached
/// tasks and report back through a channel drained on every tick.
pub async fn run_ui(
    state: ViewState,
    fetcher: MetricsFetcher,
    options: UiOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::cursor::Hide
    )?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, state, fetcher, options).await;

    // Restore the terminal even when the loop failed
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    crossterm::terminal::disable_raw_mode()?;
    result
}

struct Refresher {
    fetcher: MetricsFetcher,
    products: Vec<Product>,
    timeout: Duration,
    tx: mpsc::UnboundedSender<Event>,
    last_started: Instant,
}

impl Refresher {
    fn spawn(&mut self, generation: u64) {
        let fetcher = self.fetcher.clone();
        let products = self.products.clone();
        let timeout = self.timeout;
        let tx = self.tx.clone();
        self.last_started = Instant::now();

        log::info!("⏳ Refresh #{} started for {} products", generation, products.len());
        tokio::spawn(async move {
            let event = match fetcher.fetch_all(&products, timeout).await {
                Ok(metrics) => {
                    log::info!("✅ Refresh #{} complete ({} snapshots)", generation, metrics.len());
                    Event::RefreshCompleted { generation, metrics }
                }
                Err(e) => {
                    log::warn!("⚠️  Refresh #{} failed: {}", generation, e);
                    Event::RefreshFailed {
                        generation,
                        error: e.to_string(),
                    }
                }
            };
            // Receiver gone means the UI already quit
            let _ = tx.send(event);
        });
    }
}

/// Apply an event and run its effect; returns false once the view quits
fn dispatch(state: &mut ViewState, refresher: &mut Refresher, event: Event) -> bool {
    match state.update(event) {
        Some(Effect::Fetch { generation }) => {
            refresher.spawn(generation);
            true
        }
        Some(Effect::Quit) => false,
        None => true,
    }
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut state: ViewState,
    fetcher: MetricsFetcher,
    options: UiOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut refresher = Refresher {
        fetcher,
        products: state.products().to_vec(),
        timeout: options.refresh_timeout,
        tx,
        last_started: Instant::now(),
    };

    let size = terminal.size()?;
    dispatch(
        &mut state,
        &mut refresher,
        Event::Resize {
            width: size.width,
            height: size.height,
        },
    );
    dispatch(&mut state, &mut refresher, Event::RefreshRequested);

    let mut tick: usize = 0;
    loop {
        terminal.draw(|f| crate::ui::layout::render(f, &state, tick))?;

        while let Ok(event) = rx.try_recv() {
            dispatch(&mut state, &mut refresher, event);
        }

        if term_event::poll(TICK)? {
            let event = match term_event::read()? {
                term_event::Event::Key(key) => map_key(key),
                term_event::Event::Resize(width, height) => Some(Event::Resize { width, height }),
                _ => None,
            };
            if let Some(event) = event {
                if !dispatch(&mut state, &mut refresher, event) {
                    break;
                }
            }
        }

        if let Some(interval) = options.auto_refresh {
            if !state.loading() && refresher.last_started.elapsed() >= interval {
                log::debug!("Auto refresh after {:?}", interval);
                dispatch(&mut state, &mut refresher, Event::RefreshRequested);
            }
        }

        tick = tick.wrapping_add(1);
    }

    log::info!("Dashboard closed");
    Ok(())
}
