use crate::{
    client::{AppController, BoxView, BoxViewState, GridView, Route},
    nft::Nft,
};
use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use itertools::Itertools;
use ratatui::{prelude::*, widgets::*};
use std::io::stdout;
use unicode_width::UnicodeWidthStr;

/// Cells per grid row; with the page limit of 15 this gives three rows.
pub const GRID_COLS: usize = 5;

pub enum UserEvent {
    Quit,
    Redraw,
    LaunchApp,
    Back,
    CursorMove(isize),
    ToggleSelect,
    Choose,
    NextPage,
    PrevPage,
    Open,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            terminal: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, app: &AppController) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, app))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub async fn next_event(state: &mut UiState, route: &Route) -> Result<UserEvent> {
    loop {
        if let Event::Key(k) = event::read()? {
            if k.kind != KeyEventKind::Press {
                continue;
            }
            match &state.mode {
                Mode::QuitModal => match k.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        return Ok(UserEvent::Quit);
                    }
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        state.mode = Mode::Normal;
                        return Ok(UserEvent::Redraw);
                    }
                    _ => continue,
                },
                Mode::Normal => {}
            }
            return Ok(match k.code {
                KeyCode::Char('q') => {
                    state.mode = Mode::QuitModal;
                    UserEvent::Redraw
                }
                KeyCode::Esc | KeyCode::Backspace => match route {
                    Route::Landing => {
                        state.mode = Mode::QuitModal;
                        UserEvent::Redraw
                    }
                    _ => UserEvent::Back,
                },
                KeyCode::Enter => match route {
                    Route::Landing => UserEvent::LaunchApp,
                    Route::Grid(_) => UserEvent::Choose,
                    Route::BoxView(_) => continue,
                },
                KeyCode::Char(' ') if matches!(route, Route::Grid(_)) => {
                    UserEvent::ToggleSelect
                }
                KeyCode::Left | KeyCode::Char('h') => UserEvent::CursorMove(-1),
                KeyCode::Right | KeyCode::Char('l') => UserEvent::CursorMove(1),
                KeyCode::Up | KeyCode::Char('k') => {
                    UserEvent::CursorMove(-(GRID_COLS as isize))
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    UserEvent::CursorMove(GRID_COLS as isize)
                }
                KeyCode::Char(']') | KeyCode::Char('n') | KeyCode::PageDown => {
                    UserEvent::NextPage
                }
                KeyCode::Char('[') | KeyCode::Char('p') | KeyCode::PageUp => {
                    UserEvent::PrevPage
                }
                KeyCode::Char('o') if matches!(route, Route::BoxView(_)) => {
                    UserEvent::Open
                }
                _ => continue,
            });
        }
    }
}

fn ui(f: &mut Frame, state: &UiState, app: &AppController) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // wallet
            Constraint::Min(18),    // route body
            Constraint::Length(7),  // status/errors + help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], app);
    match &app.route {
        Route::Landing => draw_landing(f, chunks[1]),
        Route::Grid(grid) => draw_grid(f, chunks[1], grid),
        Route::BoxView(view) => draw_box(f, chunks[1], view, app),
    }
    draw_bottom(f, chunks[2], app);
    draw_modals(f, state);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, app: &AppController) {
    let text = format!(
        "Account: {} | Contract: {}",
        app.address,
        app.contract_address()
    );
    let widget = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_landing(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            "Random Box",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Lock a handful of NFTs inside a box, shake it, and open it"),
        Line::from("to get exactly one of them back. Which one is up to the"),
        Line::from("verifiable randomness oracle."),
        Line::from(""),
        Line::from("Press Enter to view your boxes."),
    ];
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Welcome"));
    f.render_widget(widget, area);
}

fn draw_grid(f: &mut Frame, area: Rect, grid: &GridView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Your Boxes | Page {} ", grid.pager.page_number()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(error) = &grid.error {
        let widget = Paragraph::new(format!("Fetch failed: {error}"))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::Red));
        f.render_widget(widget, inner);
        return;
    }
    let Some(nfts) = &grid.nfts else {
        f.render_widget(Paragraph::new("Loading..."), inner);
        return;
    };
    if nfts.is_empty() {
        f.render_widget(Paragraph::new("No boxes owned by this account."), inner);
        return;
    }

    let rows = nfts.len().div_ceil(GRID_COLS) as u16;
    let row_h = (inner.height / rows.max(1)).max(4);
    let col_w = inner.width / GRID_COLS as u16;
    let chunks = nfts.iter().enumerate().chunks(GRID_COLS);
    for (row, chunk) in chunks.into_iter().enumerate() {
        for (col, (idx, nft)) in chunk.enumerate() {
            let rect = Rect::new(
                inner.x + col as u16 * col_w,
                inner.y + row as u16 * row_h,
                col_w,
                row_h.min(inner.height.saturating_sub(row as u16 * row_h)),
            );
            if rect.height == 0 {
                continue;
            }
            let selected = grid.selection.contains(&nft.key());
            let focused = idx == grid.cursor;
            draw_nft_card(f, rect, nft, selected, focused);
        }
    }
}

/// One NFT tile: title line, image link, description. Selection shows in
/// the border colour, cursor focus in the title style.
fn draw_nft_card(f: &mut Frame, area: Rect, nft: &Nft, selected: bool, focused: bool) {
    let metadata = nft.parsed_metadata();
    let mut lines = Vec::new();
    match metadata.image.as_deref() {
        Some(image) => lines.push(Line::from(truncate(image, area.width))),
        None => lines.push(Line::from(nft.symbol.clone())),
    }
    let description = metadata.description.unwrap_or_else(|| nft.name.clone());
    lines.push(Line::from(truncate(&description, area.width)));
    lines.push(Line::from(Span::styled(
        truncate(&format!("token/{}", nft.key()), area.width),
        Style::default().fg(Color::DarkGray),
    )));

    let mut title_style = Style::default();
    if focused {
        title_style = title_style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }
    let border_style = if selected {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(nft.display_title(), title_style));
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn draw_box(f: &mut Frame, area: Rect, view: &BoxView, app: &AppController) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Box #{} ", view.box_id));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let panel = match &view.state {
        BoxViewState::Loading => {
            f.render_widget(Paragraph::new("Loading box..."), inner);
            return;
        }
        BoxViewState::Failed(message) => {
            let widget = Paragraph::new(format!("Fetch failed: {message}"))
                .wrap(Wrap { trim: false })
                .style(Style::default().fg(Color::Red));
            f.render_widget(widget, inner);
            return;
        }
        BoxViewState::Loaded(panel) => panel,
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8)])
        .split(inner);

    let mut header = format!(
        "Owner: {} | Status: {} | {} NFTs inside",
        panel.details.owner,
        panel.details.status,
        panel.details.tokens.len()
    );
    if panel.transacting {
        header.push_str(" | opening...");
    } else if panel.shows_open_button(app.address) {
        header.push_str(" | [o] Open");
    }
    f.render_widget(Paragraph::new(header).wrap(Wrap { trim: false }), rows[0]);

    if panel.shows_result() {
        draw_result(f, rows[1], panel.result_nft.as_ref());
    } else {
        draw_contents(f, rows[1], panel);
    }
}

fn draw_result(f: &mut Frame, area: Rect, result: Option<&Nft>) {
    let block = Block::default().borders(Borders::ALL).title("You won");
    let inner = block.inner(area);
    f.render_widget(&block, area);
    match result {
        Some(nft) => {
            let card = centered_rect(60, 80, inner);
            draw_nft_card(f, card, nft, false, false);
        }
        None => {
            f.render_widget(Paragraph::new("Result NFT not indexed yet."), inner);
        }
    }
}

fn draw_contents(f: &mut Frame, area: Rect, panel: &crate::client::BoxPanel) {
    let block = Block::default().borders(Borders::ALL).title(format!(
        " Contents | Page {} ",
        panel.contents_pager.page_number()
    ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(contents) = &panel.contents else {
        f.render_widget(Paragraph::new("Loading..."), inner);
        return;
    };
    let mut lines = Vec::new();
    for nft in contents {
        lines.push(Line::from(format!("- {}", nft.display_title())));
    }
    if lines.is_empty() {
        lines.push(Line::from("Nothing on this page."));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_bottom(f: &mut Frame, area: Rect, app: &AppController) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Length(3)])
        .split(area);

    let status_widget = if app.errors.is_empty() {
        Paragraph::new(app.status.as_str())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = app.errors.iter().map(|e| Line::from(e.clone())).collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, chunks[0]);

    let help = match app.route {
        Route::Landing => "Enter launch | q/Esc quit",
        Route::Grid(_) => {
            "arrows move | space select | Enter choose | [/] page | Esc back | q quit"
        }
        Route::BoxView(_) => "o open | [/] page contents | Esc back | q quit",
    };
    let help = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn truncate(text: &str, width: u16) -> String {
    let max_width = width.saturating_sub(2) as usize;
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        if out.width() + 1 >= max_width {
            break;
        }
        out.push(c);
    }
    out.push('…');
    out
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
