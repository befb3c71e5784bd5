//! UI rendering helpers for the terminal user interface.
//!
//! This module contains functions to render the TUI using `ratatui`.

use std::f64::consts::PI;
use std::sync::LazyLock;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::Marker,
    text::{Line, Span},
    widgets::canvas::{Canvas, Line as CanvasLine, Map, MapResolution, Points},
    widgets::{Block, Borders, Clear, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, InputMode};
use crate::atlas::Country;
use crate::audio::{ControllerSnapshot, SessionState, ToneBand, VisualFrame};
use crate::config::UiSettings;
use crate::passport::{Passport, Theme};
use crate::weather::weather_icon;

static CONTROLS: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    vec![
        ("j/k", "up/down"),
        ("gg/G", "top/bottom"),
        ("/", "search"),
        ("enter", "visit & play"),
        ("space/p", "pause"),
        ("x", "stop"),
        ("+/-", "volume"),
        ("r", "loop"),
        ("R", "random"),
        ("f", "favorite"),
        ("c", "collect"),
        ("u/D", "uncollect/delete collection"),
        ("e </>", "eq"),
        ("v", "visualizer"),
        ("t", "theme"),
        ("T", "tour"),
        ("n", "narrate"),
        ("E", "export"),
        ("X X", "reset passport"),
        ("q", "quit"),
    ]
});

/// Render the controls help text.
fn controls_text() -> String {
    CONTROLS
        .iter()
        .map(|(k, v)| format!("[{k}] {v}"))
        .collect::<Vec<String>>()
        .join(" | ")
}

/// Colours for one theme.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Palette {
    fg: Color,
    bg: Color,
    accent: Color,
    muted: Color,
    visited: Color,
    marker: Color,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                fg: Color::Gray,
                bg: Color::Reset,
                accent: Color::Cyan,
                muted: Color::DarkGray,
                visited: Color::Green,
                marker: Color::Yellow,
            },
            Theme::Light => Self {
                fg: Color::Black,
                bg: Color::White,
                accent: Color::Blue,
                muted: Color::Gray,
                visited: Color::Green,
                marker: Color::Red,
            },
        }
    }

    fn base(&self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }
}

/// Everything one frame needs, borrowed from the runtime.
pub struct View<'a> {
    pub app: &'a App,
    pub display: &'a [usize],
    pub passport: &'a Passport,
    pub audio: &'a ControllerSnapshot,
    pub visual: Option<&'a VisualFrame>,
    /// 1-based stop and stop count while a tour runs.
    pub tour: Option<(usize, usize)>,
    pub ui: &'a UiSettings,
}

fn bordered<'a>(title: &'a str, palette: &Palette) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(palette.muted))
        .style(palette.base())
        .padding(Padding {
            left: 1,
            right: 0,
            top: 0,
            bottom: 0,
        })
}

/// Compute a centered rectangle with given size constrained to `r`.
fn centered_rect_sized(mut width: u16, mut height: u16, r: Rect) -> Rect {
    width = width.min(r.width.saturating_sub(2)).max(10);
    height = height.min(r.height.saturating_sub(2)).max(3);

    let x = r.x + (r.width.saturating_sub(width) / 2);
    let y = r.y + (r.height.saturating_sub(height) / 2);
    Rect {
        x,
        y,
        width,
        height,
    }
}

fn format_gain(db: f32) -> String {
    if db > 0.0 {
        format!("+{db:.0}dB")
    } else {
        format!("{db:.0}dB")
    }
}

/// The status box text: passport progress, sound, mixer and mode flags.
pub(crate) fn status_text(view: &View<'_>) -> String {
    let app = view.app;
    let audio = view.audio;
    let mut parts: Vec<String> = Vec::new();

    let progress = view
        .passport
        .progress(app.countries.iter().map(|c| c.country.as_str()));
    parts.push(format!(
        "PASSPORT: {}/{} ({:.0}%)",
        progress.visited, progress.total, progress.percent
    ));

    match (&audio.source, audio.state) {
        (Some(_), Some(state)) => {
            let name = app.active_country().map(|c| c.country.as_str()).unwrap_or("?");
            parts.push(format!("SOUND: {name} [{}]", state.label()));
        }
        _ if audio.fading_out => parts.push(format!("SOUND: {}", SessionState::FadingOut.label())),
        _ => parts.push("SOUND: Stopped".to_string()),
    }

    parts.push(format!("VOL: {:.0}%", audio.volume * 100.0));
    parts.push(format!("LOOP: {}", if audio.looping { "on" } else { "off" }));

    let eq = ToneBand::ALL
        .iter()
        .map(|&band| {
            let text = format!("{} {}", band.label(), format_gain(audio.tone.gain(band)));
            if band == app.eq_band {
                format!("[{text}]")
            } else {
                text
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    parts.push(format!("EQ: {eq}"));
    parts.push(format!("VIS: {}", audio.mode.label()));

    if let Some((stop, total)) = view.tour {
        parts.push(format!("TOUR: {stop}/{total}"));
    }

    let q = app.query.trim();
    if app.input == InputMode::Search || !q.is_empty() {
        parts.push(format!("SEARCH: {}", app.query));
    }

    if let Some(msg) = &app.status {
        parts.push(msg.clone());
    }

    parts.join(" • ")
}

/// Info panel lines for `country`. Optional fields without a value are skipped.
pub(crate) fn info_lines<'a>(country: &'a Country, view: &View<'a>) -> Vec<Line<'a>> {
    let palette = Palette::for_theme(view.passport.theme());
    let mut lines: Vec<Line> = Vec::new();

    let mut title = vec![Span::styled(
        country.country.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if view.passport.is_visited(&country.country) {
        title.push(Span::styled("  ✅ Visited", Style::default().fg(palette.visited)));
    }
    if view.passport.is_favorite(&country.country) {
        title.push(Span::styled("  ★", Style::default().fg(palette.marker)));
    }
    lines.push(Line::from(title));

    let facts: Vec<String> = [
        ("Continent", country.continent.as_deref()),
        ("Category", country.category.as_deref()),
        ("Timezone", country.timezone.as_deref()),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| format!("{label}: {v}")))
    .collect();
    if !facts.is_empty() {
        lines.push(Line::from(facts.join("  ·  ")).fg(palette.muted));
    }

    if let Some(w) = view
        .app
        .weather
        .as_ref()
        .filter(|w| view.app.countries.get(w.country_index) == Some(country))
    {
        let icon = weather_icon(w.weather.code);
        let mut text = format!(
            "{} {:.1}°C, {}",
            icon.glyph(),
            w.weather.temperature_c,
            icon.label()
        );
        if !w.weather.time.is_empty() {
            text.push_str(&format!(" (at {})", w.weather.time));
        }
        lines.push(Line::from(text).fg(palette.accent));
    }

    lines.push(Line::from(""));
    if !country.description.is_empty() {
        lines.push(Line::from(country.description.as_str()));
    }
    if let Some(trivia) = &country.trivia {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Did you know? {trivia}")).italic());
    }

    let collections = view.passport.collections_of(&country.country);
    if !collections.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Collections: {}", collections.join(", "))).fg(palette.muted));
    }
    lines
}

/// Render the entire UI into the provided `frame`.
pub fn draw(frame: &mut Frame, view: &View<'_>) {
    let palette = Palette::for_theme(view.passport.theme());
    frame.render_widget(Block::default().style(palette.base()), frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    // Header
    let header = Paragraph::new(view.ui.header_text.as_str())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent))
                .title(" soundpass ")
                .title_alignment(Alignment::Center)
                .style(palette.base()),
        );
    frame.render_widget(header, chunks[0]);

    let status = Paragraph::new(status_text(view))
        .block(bordered(" status ", &palette))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, chunks[1]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(chunks[2]);
    draw_list(frame, view, &palette, main[0]);

    let mut right: Vec<Constraint> = Vec::new();
    if view.ui.show_map {
        right.push(Constraint::Percentage(45));
    }
    right.push(Constraint::Min(5));
    if view.visual.is_some() {
        right.push(Constraint::Length(10));
    }
    let panes = Layout::default()
        .direction(Direction::Vertical)
        .constraints(right)
        .split(main[1]);

    let mut pane = 0;
    if view.ui.show_map {
        draw_map(frame, view, &palette, panes[pane]);
        pane += 1;
    }
    draw_info(frame, view, &palette, panes[pane]);
    pane += 1;
    if let Some(visual) = view.visual {
        draw_visualizer(frame, visual, &palette, panes[pane]);
    }

    if view.app.input == InputMode::CollectionName {
        let popup = centered_rect_sized(48, 3, chunks[2]);
        frame.render_widget(Clear, popup);
        let prompt = Paragraph::new(format!("{}_", view.app.collection_name))
            .block(bordered(view.app.collection_action.prompt(), &palette));
        frame.render_widget(prompt, popup);
    }

    let footer = Paragraph::new(controls_text())
        .block(bordered(" controls ", &palette))
        .wrap(Wrap { trim: true });
    frame.render_widget(footer, chunks[3]);
}

fn draw_list(frame: &mut Frame, view: &View<'_>, palette: &Palette, area: Rect) {
    let app = view.app;
    let display = view.display;

    // Only build items for the visible window, keeping the selection centered.
    let total = display.len();
    let list_height = area.height.saturating_sub(2) as usize;
    let sel_pos = display.iter().position(|&i| i == app.selected).unwrap_or(0);
    let (start, end, selected_pos_in_visible) = if total <= list_height || list_height == 0 {
        (0, total, sel_pos)
    } else {
        let half = list_height / 2;
        let mut start = sel_pos.saturating_sub(half);
        if start + list_height > total {
            start = total - list_height;
        }
        (start, start + list_height, sel_pos - start)
    };

    let items: Vec<ListItem> = display[start..end]
        .iter()
        .map(|&i| {
            let name = app.countries[i].country.as_str();
            let visited = view.passport.is_visited(name);
            let mark = if visited { "✓ " } else { "  " };
            let fav = if view.passport.is_favorite(name) { " ★" } else { "" };
            let mut style = Style::default();
            if visited {
                style = style.fg(palette.visited);
            }
            if app.active == Some(i) {
                style = style.add_modifier(Modifier::BOLD);
            }
            ListItem::new(format!("{mark}{name}{fav}")).style(style)
        })
        .collect();

    let title = if app.countries.is_empty() {
        " countries (none) ".to_string()
    } else {
        format!(" countries ({}) ", total)
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.muted))
                .title(title)
                .style(palette.base()),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ratatui::widgets::ListState::default();
    if total > 0 {
        state.select(Some(selected_pos_in_visible));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_map(frame: &mut Frame, view: &View<'_>, palette: &Palette, area: Rect) {
    let app = view.app;
    let mut visited: Vec<(f64, f64)> = Vec::new();
    let mut unvisited: Vec<(f64, f64)> = Vec::new();
    for c in &app.countries {
        if view.passport.is_visited(&c.country) {
            visited.push((c.lng, c.lat));
        } else {
            unvisited.push((c.lng, c.lat));
        }
    }
    let active = app.active_country().map(|c| (c.lng, c.lat));
    let selected = app.selected_country().map(|c| (c.lng, c.lat));
    let p = *palette;

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(p.muted))
                .title(" map ")
                .style(p.base()),
        )
        .background_color(p.bg)
        .marker(Marker::Braille)
        .x_bounds([-180.0, 180.0])
        .y_bounds([-90.0, 90.0])
        .paint(move |ctx| {
            ctx.draw(&Map {
                color: p.muted,
                resolution: MapResolution::High,
            });
            ctx.layer();
            ctx.draw(&Points {
                coords: &unvisited,
                color: p.fg,
            });
            ctx.draw(&Points {
                coords: &visited,
                color: p.visited,
            });
            if let Some((x, y)) = selected {
                ctx.print(x, y, Span::styled("+", Style::default().fg(p.accent)));
            }
            if let Some((x, y)) = active {
                ctx.print(x, y, Span::styled("●", Style::default().fg(p.marker)));
            }
        });
    frame.render_widget(canvas, area);
}

fn draw_info(frame: &mut Frame, view: &View<'_>, palette: &Palette, area: Rect) {
    let block = bordered(" info ", palette);
    let paragraph = match (view.app.active_country(), &view.app.dataset_error) {
        (Some(country), _) => Paragraph::new(info_lines(country, view)),
        (None, Some(err)) => Paragraph::new(format!("Could not load countries: {err}")).fg(Color::Red),
        (None, None) => Paragraph::new("Pick a country and press enter to travel there.").fg(palette.muted),
    };
    frame.render_widget(paragraph.block(block).wrap(Wrap { trim: true }), area);
}

fn draw_visualizer(frame: &mut Frame, visual: &VisualFrame, palette: &Palette, area: Rect) {
    let p = *palette;
    let lines = visual_lines(visual);
    let (x_bounds, y_bounds) = match visual {
        VisualFrame::Bars(levels) => ([0.0, levels.len().max(1) as f64], [0.0, 1.0]),
        VisualFrame::Wave(samples) => ([0.0, samples.len().max(1) as f64], [-1.0, 1.0]),
        VisualFrame::Circular(_) => ([-1.2, 1.2], [-1.2, 1.2]),
    };
    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(p.muted))
                .title(" visualizer ")
                .style(p.base()),
        )
        .background_color(p.bg)
        .marker(Marker::Braille)
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(move |ctx| {
            for &(x1, y1, x2, y2) in &lines {
                ctx.draw(&CanvasLine::new(x1, y1, x2, y2, p.accent));
            }
        });
    frame.render_widget(canvas, area);
}

/// Line segments `(x1, y1, x2, y2)` drawing `visual` in its own coordinate space.
pub(crate) fn visual_lines(visual: &VisualFrame) -> Vec<(f64, f64, f64, f64)> {
    match visual {
        VisualFrame::Bars(levels) => levels
            .iter()
            .enumerate()
            .map(|(i, &l)| {
                let x = i as f64 + 0.5;
                (x, 0.0, x, f64::from(l))
            })
            .collect(),
        VisualFrame::Wave(samples) => samples
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i as f64, f64::from(w[0]), (i + 1) as f64, f64::from(w[1])))
            .collect(),
        VisualFrame::Circular(levels) => {
            let n = levels.len().max(1) as f64;
            levels
                .iter()
                .enumerate()
                .map(|(i, &l)| {
                    // Clockwise from twelve o'clock.
                    let angle = PI / 2.0 - 2.0 * PI * i as f64 / n;
                    let (inner, outer) = (0.5, 0.5 + 0.6 * f64::from(l));
                    (
                        inner * angle.cos(),
                        inner * angle.sin(),
                        outer * angle.cos(),
                        outer * angle.sin(),
                    )
                })
                .collect()
        }
    }
}
