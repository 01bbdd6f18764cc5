use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

use crate::app::App;
use crate::clock::Clock;
use crate::format::{format_duration, Locale};
use crate::tracker::Snapshot;

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;

struct Labels {
    title: &'static str,
    total: &'static str,
    per_min: &'static str,
    active: &'static str,
    session: &'static str,
    streak: &'static str,
    best: &'static str,
    boost: &'static str,
    slow_down: &'static str,
    paused: &'static str,
    help: &'static str,
    tasks: &'static str,
    task_help: &'static str,
}

fn labels(locale: Locale) -> Labels {
    match locale {
        Locale::English => Labels {
            title: " clickpace ",
            total: "total",
            per_min: "per",
            active: "active",
            session: "session",
            streak: "streak",
            best: "best",
            boost: "BOOST",
            slow_down: "TEMPO DROPPED",
            paused: "paused",
            help: "space/enter/0-9 count · a/←/⌫ undo · r reset · q quit",
            tasks: " tasks ",
            task_help: " ↑/↓ move · f finish · R clear ",
        },
        Locale::Russian => Labels {
            title: " clickpace ",
            total: "всего",
            per_min: "за",
            active: "активно",
            session: "сессия",
            streak: "серия",
            best: "рекорд",
            boost: "УСКОРЕНИЕ",
            slow_down: "ТЕМП УПАЛ",
            paused: "пауза",
            help: "пробел/enter/0-9 счёт · a/←/⌫ отмена · r сброс · q выход",
            tasks: " задачи ",
            task_help: " ↑/↓ выбор · f готово · R очистить ",
        },
    }
}

fn rate_lines<'a>(snap: &Snapshot, l: &Labels, value_style: Style) -> Vec<Line<'a>> {
    [(1, snap.c1), (5, snap.c5), (15, snap.c15), (60, snap.c60)]
        .into_iter()
        .map(|(mins, count)| {
            Line::from(vec![
                Span::raw(format!("{} {:>2} min: ", l.per_min, mins)),
                Span::styled(count.to_string(), value_style),
            ])
        })
        .collect()
}

/// Task titles, scrolled so the selection stays visible
fn render_tasks<C: Clock>(app: &App<C>, l: &Labels, area: Rect, buf: &mut Buffer) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(l.tasks)
        .title_bottom(Line::from(l.task_help).alignment(Alignment::Center));
    let inner = block.inner(area);
    block.render(area, buf);

    let tasks = app.tasks();
    let selected = app
        .selected()
        .and_then(|sel| tasks.iter().position(|t| t.href == sel.href));
    let height = usize::from(inner.height).max(1);
    let skip = selected.map_or(0, |i| (i + 1).saturating_sub(height));

    let lines: Vec<Line> = tasks
        .iter()
        .enumerate()
        .skip(skip)
        .take(height)
        .map(|(i, task)| {
            let id = task.task_id().unwrap_or("?");
            let text = format!("{id:>6} {}", task.title);
            if Some(i) == selected {
                Line::from(Span::styled(
                    format!("▶{text}"),
                    Style::default().add_modifier(Modifier::REVERSED),
                ))
            } else {
                Line::from(format!(" {text}"))
            }
        })
        .collect();
    Paragraph::new(lines).render(inner, buf);
}

impl<C: Clock> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let snap = &self.snapshot;
        let l = labels(self.locale);

        let area = if self.tasks().is_empty() {
            area
        } else {
            let halves = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(40), Constraint::Percentage(45)])
                .split(area);
            render_tasks(self, &l, halves[1], buf);
            halves[0]
        };

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let value_style = if snap.boost_active {
            bold_style.fg(Color::Green)
        } else {
            bold_style
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(l.title, bold_style));
        let inner = block.inner(area);
        block.render(area, buf);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(2),
                Constraint::Length(4),
                Constraint::Length(5),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(inner);

        let mut status = vec![Span::styled(
            format!("{} {}", l.total, snap.total_count),
            bold_style.fg(Color::Cyan),
        )];
        if snap.boost_active {
            status.push(Span::raw("  "));
            status.push(Span::styled(l.boost, bold_style.fg(Color::Green)));
        }
        if snap.paused {
            status.push(Span::raw("  "));
            status.push(Span::styled(
                l.paused,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::ITALIC),
            ));
        }
        Paragraph::new(Line::from(status)).render(chunks[0], buf);

        Paragraph::new(rate_lines(snap, &l, value_style)).render(chunks[1], buf);

        let duration = |ms| format_duration(ms, self.locale);
        let times = vec![
            Line::from(format!("{}: {}", l.active, duration(snap.active_time_ms))),
            Line::from(format!("{}: {}", l.session, duration(snap.elapsed_session_ms))),
            Line::from(format!("{}: {}", l.streak, duration(snap.current_streak_ms))),
            Line::from(format!("{}: {}", l.best, duration(snap.best_streak_ms))),
        ];
        Paragraph::new(times).render(chunks[2], buf);

        if snap.warning_active {
            Paragraph::new(Span::styled(
                l.slow_down,
                bold_style.fg(Color::White).bg(Color::Red),
            ))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled(l.help, dim_style))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
    }
}
