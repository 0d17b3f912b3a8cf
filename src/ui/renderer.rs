// Renderer module - column sizing and cell formatting
// Drawing lives in layout.rs; everything here is plain string work so it can
// be tested without a terminal.

/// Spaces between adjacent columns
pub const COLUMN_GAP: usize = 2;

/// Gaps between the 8 table columns
const GAP_COUNT: usize = 7;

const VISITS_WIDTH: usize = 7;
const TREND_WIDTH: usize = 7;
const MRR_WIDTH: usize = 8;
const SUBS_WIDTH: usize = 5;
const HEALTH_WIDTH: usize = 6;
const LATENCY_WIDTH: usize = 7;

const MIN_NAME: usize = 12;
const MIN_DOMAIN: usize = 18;
const MIN_NAME_FLOOR: usize = 6;
const MIN_DOMAIN_FLOOR: usize = 8;

/// Widths of the eight table columns, left to right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnWidths {
    pub name: usize,
    pub domain: usize,
    pub visits: usize,
    pub trend: usize,
    pub mrr: usize,
    pub subs: usize,
    pub health: usize,
    pub latency: usize,
}

impl ColumnWidths {
    /// Split a terminal width across the table columns
    ///
    /// Fixed columns keep their constant widths and name/domain share what is
    /// left. When even the fixed columns do not fit, they are filled left to
    /// right from the space remaining after the gaps so the table never
    /// exceeds `width`.
    pub fn calc(width: u16) -> Self {
        let width = width as usize;
        if width == 0 {
            return Self::default();
        }

        let fixed = [
            VISITS_WIDTH,
            TREND_WIDTH,
            MRR_WIDTH,
            SUBS_WIDTH,
            HEALTH_WIDTH,
            LATENCY_WIDTH,
        ];
        let reserved = fixed.iter().sum::<usize>() + COLUMN_GAP * GAP_COUNT;

        if width <= reserved {
            let mut budget = width.saturating_sub(COLUMN_GAP * GAP_COUNT);
            let mut squeezed = [0usize; 6];
            for (slot, want) in squeezed.iter_mut().zip(fixed) {
                *slot = want.min(budget);
                budget -= *slot;
            }
            return Self {
                name: 0,
                domain: 0,
                visits: squeezed[0],
                trend: squeezed[1],
                mrr: squeezed[2],
                subs: squeezed[3],
                health: squeezed[4],
                latency: squeezed[5],
            };
        }

        let available = width - reserved;
        let (name, domain) = if available < MIN_NAME_FLOOR + MIN_DOMAIN_FLOOR {
            let name = available / 2;
            (name, available - name)
        } else if available < MIN_NAME + MIN_DOMAIN {
            let name = MIN_NAME_FLOOR.max(available * MIN_NAME / (MIN_NAME + MIN_DOMAIN));
            let mut domain = MIN_DOMAIN_FLOOR.max(available.saturating_sub(name));
            if name + domain > available {
                domain = available.saturating_sub(name);
            }
            (name, domain)
        } else {
            let extra = available - (MIN_NAME + MIN_DOMAIN);
            (MIN_NAME + extra / 3, MIN_DOMAIN + extra - extra / 3)
        };

        Self {
            name,
            domain,
            visits: VISITS_WIDTH,
            trend: TREND_WIDTH,
            mrr: MRR_WIDTH,
            subs: SUBS_WIDTH,
            health: HEALTH_WIDTH,
            latency: LATENCY_WIDTH,
        }
    }

    pub fn as_array(&self) -> [usize; 8] {
        [
            self.name,
            self.domain,
            self.visits,
            self.trend,
            self.mrr,
            self.subs,
            self.health,
            self.latency,
        ]
    }

    /// Rendered table width including gaps; zero when every column is empty
    pub fn total_width(&self) -> usize {
        let sum: usize = self.as_array().iter().sum();
        if sum == 0 {
            return 0;
        }
        sum + COLUMN_GAP * GAP_COUNT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Cut `value` to `width` characters, ending in "..." when there is room
pub fn truncate(value: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let len = value.chars().count();
    if len <= width {
        return value.to_string();
    }
    if width <= 3 {
        return ".".repeat(width);
    }
    let mut out: String = value.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

/// Truncate then pad to exactly `width` characters
pub fn fit(value: &str, width: usize, align: Align) -> String {
    let text = truncate(value, width);
    let pad = width.saturating_sub(text.chars().count());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(pad)),
        Align::Right => format!("{}{}", " ".repeat(pad), text),
        Align::Center => {
            let left = pad / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(pad - left))
        }
    }
}

/// Format cents as dollars
pub fn format_currency(cents: i64) -> String {
    format!("${:.2}", cents as f64 / 100.0)
}

/// Format an integer with thousands separators
pub fn format_number(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    let lead = match digits.len() % 3 {
        0 => 3,
        n => n,
    };
    out.push_str(&digits[..lead.min(digits.len())]);
    let mut i = lead;
    while i < digits.len() {
        out.push(',');
        out.push_str(&digits[i..i + 3]);
        i += 3;
    }
    out
}

pub fn format_latency(ms: i64) -> String {
    if ms > 0 {
        format!("{}ms", ms)
    } else {
        "n/a".to_string()
    }
}

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Block-character sparkline of at most `width` points (the most recent ones)
pub fn sparkline(values: &[i64], width: usize) -> String {
    if width == 0 || values.is_empty() {
        return String::new();
    }
    let start = values.len().saturating_sub(width);
    let points: Vec<i64> = values[start..].iter().map(|v| (*v).max(0)).collect();
    let max = points.iter().copied().max().unwrap_or(0);

    points
        .iter()
        .map(|v| {
            if max == 0 {
                return SPARK_LEVELS[0];
            }
            let level = (*v as f64 / max as f64 * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}
