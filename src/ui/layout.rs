use {
    crate::{
        signals::Signal,
        types::{HealthStatus, MetricsSnapshot},
        ui::{
            renderer::{
                fit, format_currency, format_latency, format_number, sparkline, Align,
                ColumnWidths, COLUMN_GAP,
            },
            state::{SortKey, ViewState, HELP_TEXT},
        },
    },
    ratatui::{
        layout::Rect,
        style::{Color, Modifier, Style},
        text::{Line, Span},
        widgets::Paragraph,
        Frame,
    },
};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const TRACTION: Color = Color::Rgb(245, 158, 11);

fn title_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn muted_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn error_style() -> Style {
    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
}

fn signal_style(signal: Signal) -> Style {
    match signal {
        Signal::Traction => Style::default().fg(TRACTION).add_modifier(Modifier::BOLD),
        Signal::Dead => muted_style(),
        Signal::Neutral => Style::default(),
    }
}

fn health_style(status: HealthStatus) -> Style {
    match status {
        HealthStatus::Healthy => Style::default().fg(Color::Green),
        HealthStatus::Degraded => Style::default().fg(Color::Yellow),
        HealthStatus::Down => Style::default().fg(Color::Red),
        HealthStatus::Unknown => muted_style(),
    }
}

fn health_glyph(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "● up",
        HealthStatus::Degraded => "◐ slow",
        HealthStatus::Down => "○ down",
        HealthStatus::Unknown => "· ?",
    }
}

/// Render the whole dashboard for one frame
pub fn render(f: &mut Frame, state: &ViewState, tick: usize) {
    let area = f.area();

    if state.loading() && state.metrics().is_empty() {
        render_loading(f, area, tick);
        return;
    }

    let mut lines: Vec<Line> = Vec::with_capacity(area.height as usize);

    lines.push(Line::styled("PRODUCTS", title_style()));

    if let Some(err) = state.last_error() {
        lines.push(Line::styled(format!("Error: {}", err), error_style()));
    }

    if state.products().is_empty() {
        lines.push(Line::styled("No products configured.", muted_style()));
    } else {
        let columns = state.columns();
        lines.push(header_line(&columns, state.sort_key(), state.sort_desc()));
        lines.push(Line::styled(
            "─".repeat(state.table_width()),
            muted_style(),
        ));

        for (index, product) in state.visible_rows() {
            let metrics = state.metrics_for(&product.name);
            let mut line = row_line(&columns, &product.name, &product.domain, metrics);
            if index == state.selected() {
                line = line.style(Style::default().add_modifier(Modifier::REVERSED));
            }
            lines.push(line);
        }
    }

    let mut status = vec![Span::raw(state.status_line())];
    let warnings = state.warning_count();
    if warnings > 0 {
        status.push(Span::styled(
            format!(" • {} with provider warnings", warnings),
            Style::default().fg(Color::Yellow),
        ));
    }
    if state.loading() {
        status.push(Span::styled(
            format!(" • {} refreshing…", SPINNER[tick % SPINNER.len()]),
            muted_style(),
        ));
    }
    let footer_at = area.height.saturating_sub(2) as usize;
    while lines.len() < footer_at {
        lines.push(Line::raw(""));
    }
    lines.push(Line::from(status));
    lines.push(Line::styled(HELP_TEXT, muted_style()));

    f.render_widget(Paragraph::new(lines), area);
}

fn render_loading(f: &mut Frame, area: Rect, tick: usize) {
    let text = vec![
        Line::styled("OVERMIND", title_style()),
        Line::raw(""),
        Line::from(vec![
            Span::styled(SPINNER[tick % SPINNER.len()], Style::default().fg(Color::Cyan)),
            Span::raw(" Loading metrics..."),
        ]),
    ];
    f.render_widget(Paragraph::new(text), area);
}

fn gap() -> Span<'static> {
    Span::raw(" ".repeat(COLUMN_GAP))
}

fn header_line(columns: &ColumnWidths, key: SortKey, desc: bool) -> Line<'static> {
    let arrow = if desc { "▼" } else { "▲" };
    // The label gives up characters before the arrow does.
    let label = |text: &str, column: SortKey, width: usize| {
        if column != key {
            return text.to_string();
        }
        if width < 3 {
            return arrow.to_string();
        }
        let kept: String = text.chars().take(width - 2).collect();
        format!("{} {}", kept, arrow)
    };

    let cells = [
        (label("PRODUCT", SortKey::Name, columns.name), columns.name, Align::Left),
        ("DOMAIN".to_string(), columns.domain, Align::Left),
        (label("VISITS", SortKey::Visits, columns.visits), columns.visits, Align::Right),
        ("TREND".to_string(), columns.trend, Align::Center),
        (label("MRR", SortKey::Mrr, columns.mrr), columns.mrr, Align::Right),
        ("SUBS".to_string(), columns.subs, Align::Right),
        (label("HEALTH", SortKey::Health, columns.health), columns.health, Align::Left),
        ("LATENCY".to_string(), columns.latency, Align::Right),
    ];

    let style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut spans = Vec::with_capacity(cells.len() * 2);
    for (i, (text, width, align)) in cells.into_iter().enumerate() {
        if i > 0 {
            spans.push(gap());
        }
        spans.push(Span::styled(fit(&text, width, align), style));
    }
    Line::from(spans)
}

fn row_line(
    columns: &ColumnWidths,
    name: &str,
    domain: &str,
    metrics: Option<&MetricsSnapshot>,
) -> Line<'static> {
    let cells: [(String, usize, Align, Style); 8] = match metrics {
        Some(m) => {
            let signal = m.signal();
            [
                (name.to_string(), columns.name, Align::Left, signal_style(signal)),
                (domain.to_string(), columns.domain, Align::Left, muted_style()),
                (format_number(m.visits), columns.visits, Align::Right, Style::default()),
                (sparkline(&m.trend, columns.trend), columns.trend, Align::Center, Style::default().fg(Color::Cyan)),
                (format_currency(m.mrr), columns.mrr, Align::Right, Style::default()),
                (format_number(m.subscribers), columns.subs, Align::Right, Style::default()),
                (health_glyph(m.health).to_string(), columns.health, Align::Left, health_style(m.health)),
                (format_latency(m.latency_ms), columns.latency, Align::Right, muted_style()),
            ]
        }
        None => {
            let dash = || "-".to_string();
            [
                (name.to_string(), columns.name, Align::Left, Style::default()),
                (domain.to_string(), columns.domain, Align::Left, muted_style()),
                (dash(), columns.visits, Align::Right, muted_style()),
                (dash(), columns.trend, Align::Center, muted_style()),
                (dash(), columns.mrr, Align::Right, muted_style()),
                (dash(), columns.subs, Align::Right, muted_style()),
                (dash(), columns.health, Align::Left, muted_style()),
                (dash(), columns.latency, Align::Right, muted_style()),
            ]
        }
    };

    let mut spans = Vec::with_capacity(cells.len() * 2);
    for (i, (text, width, align, style)) in cells.into_iter().enumerate() {
        if i > 0 {
            spans.push(gap());
        }
        spans.push(Span::styled(fit(&text, width, align), style));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;
    use crate::ui::state::Event;
    use chrono::Utc;
    use ratatui::{backend::TestBackend, Terminal};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for row in buffer.content.chunks(buffer.area.width as usize) {
            for cell in row {
                out.push_str(cell.symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_row_width_matches_table_width() {
        for width in [40u16, 60, 80, 120, 200] {
            let columns = ColumnWidths::calc(width);
            let mut m = MetricsSnapshot::empty("chrondle", Utc::now());
            m.visits = 123_456;
            m.mrr = 99_900;
            m.trend = vec![1, 5, 3, 8, 2, 9, 4];
            m.health = HealthStatus::Healthy;
            m.latency_ms = 230;

            let row = row_line(&columns, "chrondle-with-a-long-name", "chrondle.app", Some(&m));
            assert_eq!(line_text(&row).chars().count(), columns.total_width());

            let empty = row_line(&columns, "x", "x.app", None);
            assert_eq!(line_text(&empty).chars().count(), columns.total_width());

            let header = header_line(&columns, SortKey::Mrr, true);
            assert_eq!(line_text(&header).chars().count(), columns.total_width());
        }
    }

    #[test]
    fn test_header_marks_active_sort() {
        let columns = ColumnWidths::calc(120);
        let text = line_text(&header_line(&columns, SortKey::Visits, true));
        assert!(text.contains("VISIT ▼"), "{}", text);
        assert!(!text.contains("MRR ▼"));
        assert_eq!(text.matches('▼').count(), 1);

        let text = line_text(&header_line(&columns, SortKey::Health, false));
        assert!(text.contains("HEAL ▲"), "{}", text);
        assert!(!text.contains('▼'));

        let text = line_text(&header_line(&columns, SortKey::Mrr, true));
        assert!(text.contains("MRR ▼"), "{}", text);

        let text = line_text(&header_line(&columns, SortKey::Name, false));
        assert!(text.contains("PRODUCT ▲"), "{}", text);
    }

    #[test]
    fn test_sort_arrow_survives_narrow_terminals() {
        for width in [20u16, 40, 54, 60, 80] {
            let columns = ColumnWidths::calc(width);
            for key in [SortKey::Name, SortKey::Visits, SortKey::Mrr, SortKey::Health] {
                let header = header_line(&columns, key, true);
                let text = line_text(&header);
                let wide_enough = match key {
                    SortKey::Name => columns.name,
                    SortKey::Visits => columns.visits,
                    SortKey::Mrr => columns.mrr,
                    SortKey::Health => columns.health,
                } > 0;
                assert_eq!(text.contains('▼'), wide_enough, "width={} key={:?}: {}", width, key, text);
                assert_eq!(text.chars().count(), columns.total_width());
            }
        }
    }

    #[test]
    fn test_render_loading_and_table() {
        let backend = TestBackend::new(100, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        let mut state = ViewState::new(vec![Product::new("alpha", "alpha.app")]);
        state.update(Event::Resize { width: 100, height: 12 });

        terminal.draw(|f| render(f, &state, 0)).unwrap();
        assert!(buffer_text(&terminal).contains("Loading metrics..."));

        let generation = state.generation() + 1;
        state.update(Event::RefreshRequested);
        let mut m = MetricsSnapshot::empty("alpha", Utc::now());
        m.visits = 1500;
        m.notes.push("Stripe: boom".to_string());
        state.update(Event::RefreshCompleted {
            generation,
            metrics: [("alpha".to_string(), m)].into_iter().collect(),
        });

        terminal.draw(|f| render(f, &state, 0)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("alpha"));
        assert!(text.contains("1,500"));
        assert!(text.contains("Total: $0.00 MRR • 1,500 visits • 1 products"));
        assert!(text.contains("1 with provider warnings"));
        assert!(text.contains(HELP_TEXT));
    }
}
