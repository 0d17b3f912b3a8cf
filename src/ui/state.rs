//! Table view state - single-threaded reducer for the dashboard
//!
//! ## Architecture
//!
//! ```text
//! terminal loop ──Event──▶ ViewState::update ──Option<Effect>──▶ terminal loop
//!                                                     │
//!                               Effect::Fetch{gen} ───┴──▶ spawned refresh
//!                                                     │
//! RefreshCompleted{gen} / RefreshFailed{gen} ◀────────┘
//! ```
//!
//! Every mutation goes through [`ViewState::update`]; the terminal loop owns
//! the only instance. Refreshes are tagged with a generation number and a
//! completion from a superseded generation is dropped.
//!
//! ## Invariants
//!
//! - `selected < products.len()` whenever products is non-empty
//! - `viewport_offset <= max(0, rows - viewport_height)`
//! - the metrics map is only ever replaced wholesale

use crate::pipeline::MetricsBatch;
use crate::types::{MetricsSnapshot, Product};
use crate::ui::renderer::{format_currency, format_number, ColumnWidths};
use std::cmp::Ordering;

/// Title line
const TITLE_LINES: usize = 1;
/// Column header + divider
const HEADER_LINES: usize = 2;
/// Status + help
const FOOTER_LINES: usize = 2;

pub const HELP_TEXT: &str = "r refresh • s sort • q quit • j/k navigate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Mrr,
    Visits,
    Name,
    Health,
}

impl SortKey {
    /// Next key in the cycle and its default direction (true = descending)
    pub fn next(self) -> (SortKey, bool) {
        match self {
            SortKey::Mrr => (SortKey::Visits, true),
            SortKey::Visits => (SortKey::Name, false),
            SortKey::Name => (SortKey::Health, false),
            SortKey::Health => (SortKey::Mrr, true),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Mrr => "MRR",
            SortKey::Visits => "visits",
            SortKey::Name => "name",
            SortKey::Health => "health",
        }
    }
}

/// Inputs to the reducer
#[derive(Debug, Clone)]
pub enum Event {
    Resize { width: u16, height: u16 },
    RefreshRequested,
    RefreshCompleted { generation: u64, metrics: MetricsBatch },
    RefreshFailed { generation: u64, error: String },
    SortCycle,
    MoveSelection(i32),
    Quit,
}

/// Follow-up work the terminal loop must perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a refresh and report back with this generation
    Fetch { generation: u64 },
    Quit,
}

#[derive(Debug)]
pub struct ViewState {
    products: Vec<Product>,
    metrics: MetricsBatch,
    sort_key: SortKey,
    sort_desc: bool,
    selected: usize,
    viewport_offset: usize,
    viewport_height: usize,
    term_width: u16,
    term_height: u16,
    columns: ColumnWidths,
    loading: bool,
    last_error: Option<String>,
    generation: u64,
}

impl ViewState {
    pub fn new(products: Vec<Product>) -> Self {
        let mut state = Self {
            products,
            metrics: MetricsBatch::new(),
            sort_key: SortKey::Mrr,
            sort_desc: true,
            selected: 0,
            viewport_offset: 0,
            viewport_height: 0,
            term_width: 0,
            term_height: 0,
            columns: ColumnWidths::default(),
            loading: true,
            last_error: None,
            generation: 0,
        };
        state.sort_products();
        state
    }

    /// Show cached snapshots before the first refresh lands
    ///
    /// Does not touch the loading flag or the generation counter.
    pub fn seed(&mut self, metrics: MetricsBatch) {
        if metrics.is_empty() {
            return;
        }
        self.metrics = metrics;
        self.sort_products();
        self.sync_viewport();
    }

    /// Apply one event, returning the follow-up effect if any
    pub fn update(&mut self, event: Event) -> Option<Effect> {
        match event {
            Event::Resize { width, height } => {
                self.term_width = width;
                self.term_height = height;
                self.relayout();
                self.sync_viewport();
                None
            }
            Event::RefreshRequested => {
                self.loading = true;
                self.last_error = None;
                self.generation += 1;
                self.relayout();
                Some(Effect::Fetch {
                    generation: self.generation,
                })
            }
            Event::RefreshCompleted { generation, metrics } => {
                if generation != self.generation {
                    log::debug!(
                        "Dropping stale refresh {} (current {})",
                        generation,
                        self.generation
                    );
                    return None;
                }
                self.loading = false;
                self.metrics = metrics;
                self.sort_products();
                self.relayout();
                self.sync_viewport();
                None
            }
            Event::RefreshFailed { generation, error } => {
                if generation != self.generation {
                    log::debug!("Dropping stale failure {}: {}", generation, error);
                    return None;
                }
                self.loading = false;
                self.last_error = Some(error);
                self.relayout();
                self.sync_viewport();
                None
            }
            Event::SortCycle => {
                let (key, desc) = self.sort_key.next();
                self.sort_key = key;
                self.sort_desc = desc;
                self.sort_products();
                self.sync_viewport();
                None
            }
            Event::MoveSelection(delta) => {
                self.move_selection(delta);
                None
            }
            Event::Quit => Some(Effect::Quit),
        }
    }

    fn move_selection(&mut self, delta: i32) {
        if self.products.is_empty() {
            return;
        }
        let last = self.products.len() as i64 - 1;
        let next = (self.selected as i64 + delta as i64).clamp(0, last) as usize;
        if next == self.selected {
            return;
        }
        self.selected = next;
        self.sync_viewport();
    }

    fn chrome_lines(&self) -> usize {
        TITLE_LINES + HEADER_LINES + FOOTER_LINES + usize::from(self.last_error.is_some())
    }

    fn relayout(&mut self) {
        self.columns = ColumnWidths::calc(self.term_width);
        if self.term_width == 0 && self.term_height == 0 {
            // no size reported yet
            self.viewport_height = 0;
            return;
        }
        self.viewport_height = (self.term_height as usize)
            .saturating_sub(self.chrome_lines())
            .max(1);
        self.clamp_offset();
    }

    fn clamp_offset(&mut self) {
        let max_offset = self.products.len().saturating_sub(self.viewport_height);
        self.viewport_offset = self.viewport_offset.min(max_offset);
    }

    /// Scroll minimally so the selected row is inside the viewport
    fn sync_viewport(&mut self) {
        if self.viewport_height == 0 {
            return;
        }
        if self.selected < self.viewport_offset {
            self.viewport_offset = self.selected;
        } else if self.selected >= self.viewport_offset + self.viewport_height {
            self.viewport_offset = self.selected + 1 - self.viewport_height;
        }
        self.clamp_offset();
    }

    fn sort_products(&mut self) {
        let selected_name = self.products.get(self.selected).map(|p| p.name.clone());

        let metrics = &self.metrics;
        let key = self.sort_key;
        let desc = self.sort_desc;
        self.products
            .sort_by(|a, b| compare_products(a, b, metrics, key, desc));

        let found = selected_name
            .and_then(|name| self.products.iter().position(|p| p.name == name));
        self.selected = match found {
            Some(index) => index,
            None => self.selected.min(self.products.len().saturating_sub(1)),
        };
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn metrics(&self) -> &MetricsBatch {
        &self.metrics
    }

    pub fn metrics_for(&self, name: &str) -> Option<&MetricsSnapshot> {
        self.metrics.get(name)
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.products.get(self.selected)
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_desc(&self) -> bool {
        self.sort_desc
    }

    pub fn viewport_offset(&self) -> usize {
        self.viewport_offset
    }

    pub fn viewport_height(&self) -> usize {
        self.viewport_height
    }

    pub fn columns(&self) -> ColumnWidths {
        self.columns
    }

    pub fn table_width(&self) -> usize {
        self.columns.total_width()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rows inside the viewport, paired with their absolute index
    pub fn visible_rows(&self) -> impl Iterator<Item = (usize, &Product)> {
        self.products
            .iter()
            .enumerate()
            .skip(self.viewport_offset)
            .take(self.viewport_height)
    }

    /// (first, last, total) as 1-based row numbers when rows overflow the viewport
    pub fn scroll_position(&self) -> Option<(usize, usize, usize)> {
        let total = self.products.len();
        if self.viewport_height == 0 || total <= self.viewport_height {
            return None;
        }
        let first = self.viewport_offset + 1;
        let last = (self.viewport_offset + self.viewport_height).min(total);
        Some((first, last, total))
    }

    /// Summed MRR (cents) and visits over products with metrics
    pub fn totals(&self) -> (i64, i64) {
        self.products
            .iter()
            .filter_map(|p| self.metrics.get(&p.name))
            .fold((0, 0), |(mrr, visits), m| (mrr + m.mrr, visits + m.visits))
    }

    /// Products whose latest snapshot carries partial-failure notes
    pub fn warning_count(&self) -> usize {
        self.products
            .iter()
            .filter_map(|p| self.metrics.get(&p.name))
            .filter(|m| !m.notes.is_empty())
            .count()
    }

    pub fn status_line(&self) -> String {
        let (mrr, visits) = self.totals();
        let mut line = format!(
            "Total: {} MRR • {} visits • {} products",
            format_currency(mrr),
            format_number(visits),
            self.products.len()
        );
        if let Some((first, last, total)) = self.scroll_position() {
            line.push_str(&format!(" • scroll {}-{}/{}", first, last, total));
        }
        line
    }
}

fn compare_products(
    a: &Product,
    b: &Product,
    metrics: &MetricsBatch,
    key: SortKey,
    desc: bool,
) -> Ordering {
    let ma = metrics.get(&a.name);
    let mb = metrics.get(&b.name);

    let directed = |ord: Ordering| if desc { ord.reverse() } else { ord };
    let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());

    match key {
        SortKey::Mrr => {
            let (x, y) = (ma.map_or(0, |m| m.mrr), mb.map_or(0, |m| m.mrr));
            directed(x.cmp(&y)).then_with(by_name)
        }
        SortKey::Visits => {
            let (x, y) = (ma.map_or(0, |m| m.visits), mb.map_or(0, |m| m.visits));
            directed(x.cmp(&y)).then_with(by_name)
        }
        SortKey::Health => {
            let rank = |m: Option<&MetricsSnapshot>| m.map_or(3, |m| m.health.rank());
            directed(rank(ma).cmp(&rank(mb))).then_with(by_name)
        }
        SortKey::Name => directed(by_name()).then_with(|| a.domain.cmp(&b.domain)),
    }
}
