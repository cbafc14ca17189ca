mod config;
mod dispatch;
mod export;
mod history;
mod markdown;
mod preview;
mod render;
mod session;
mod turn;

use iced::{
    alignment,
    event::{self, Event as IcedEvent},
    font,
    keyboard::{self, Key},
    time,
    widget::{
        button, column, container, horizontal_rule, row, scrollable, text, text_input, Column,
        Row,
    },
    window, Color, Element, Font, Length, Size, Subscription, Task, Theme,
};
use anyhow::Context;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use dispatch::{AskResponse, DispatchError, Dispatcher};
use history::HistoryStore;
use markdown::Block;
use preview::{PreviewSection, PreviewTable, NO_DATA_NOTICE};
use render::{ChatEntry, SidebarCard};
use session::{ChatSession, PendingAsk};

const SIDEBAR_WIDTH: f32 = 360.0;
const LOADING_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const META_COLOR: Color = Color::from_rgb(0.55, 0.58, 0.68);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting hr-chat v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load();
    let store = HistoryStore::open_or_in_memory(&history::db_path())
        .context("No history store available")?;
    let size = Size::new(config.window.width as f32, config.window.height as f32);
    let min_size = Size::new(config.window.min_width as f32, config.window.min_height as f32);

    iced::application("HR Chat", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size,
            min_size: Some(min_size),
            position: window::Position::Centered,
            ..Default::default()
        })
        .run_with(move || App::new(config, store))
        .map_err(|e| anyhow::anyhow!("UI error: {}", e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    SqlRaw,
    SqlExpanded,
    Preview,
}

/// Which collapsible section a toggle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Fold {
    Pane(usize),
    Sidebar(usize, Section),
}

impl Fold {
    /// SQL sections start collapsed, previews start open.
    fn open_by_default(&self) -> bool {
        !matches!(self, Fold::Sidebar(_, Section::SqlRaw | Section::SqlExpanded))
    }
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    Submit,
    AnswerReceived(Result<AskResponse, DispatchError>),
    Tick,
    Toggle(Fold),
    Download,
    DownloadHtml,
    ClearRequested,
    ClearConfirmed,
    ClearCancelled,
}

struct App {
    session: ChatSession,
    dispatcher: Dispatcher,
    export_dir: PathBuf,
    input_text: String,
    pending: Option<PendingAsk>,
    loading_frame: usize,
    toggled: HashSet<Fold>,
    confirming_clear: bool,
    status: Option<String>,
    chat_scroll: scrollable::Id,
}

impl App {
    fn new(config: config::Config, store: HistoryStore) -> (Self, Task<Message>) {
        let dispatcher =
            Dispatcher::with_config(config.backend.api_url, config.backend.access_code);
        tracing::info!(url = %dispatcher.api_url(), "Backend configured");

        let input_id = text_input::Id::new("question");

        let app = App {
            session: ChatSession::new(store),
            dispatcher,
            export_dir: config.export.dir,
            input_text: String::new(),
            pending: None,
            loading_frame: 0,
            toggled: HashSet::new(),
            confirming_clear: false,
            status: None,
            chat_scroll: scrollable::Id::unique(),
        };

        (app, text_input::focus(input_id))
    }

    fn is_open(&self, fold: Fold) -> bool {
        fold.open_by_default() != self.toggled.contains(&fold)
    }

    fn scroll_to_end(&self) -> Task<Message> {
        scrollable::snap_to(self.chat_scroll.clone(), scrollable::RelativeOffset::END)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.input_text = value;
                Task::none()
            }
            Message::Submit => {
                let Some(pending) = self.session.begin(&self.input_text) else {
                    return Task::none();
                };

                self.status = None;
                let dispatcher = self.dispatcher.clone();
                let request = pending.request.clone();
                self.pending = Some(pending);

                Task::batch([
                    self.scroll_to_end(),
                    Task::future(async move {
                        Message::AnswerReceived(dispatcher.send(&request).await)
                    }),
                ])
            }
            Message::AnswerReceived(result) => {
                let Some(pending) = self.pending.take() else {
                    return Task::none();
                };
                self.session.complete(pending, result);
                self.input_text.clear();
                self.scroll_to_end()
            }
            Message::Tick => {
                if self.session.is_loading() {
                    self.loading_frame = (self.loading_frame + 1) % LOADING_FRAMES.len();
                }
                Task::none()
            }
            Message::Toggle(fold) => {
                if !self.toggled.remove(&fold) {
                    self.toggled.insert(fold);
                }
                Task::none()
            }
            Message::Download => {
                self.status = Some(
                    match export::write_transcript(&self.export_dir, self.session.history()) {
                        Ok(path) => format!("Сохранено: {}", path.display()),
                        Err(e) => {
                            tracing::warn!(error = %e, "Transcript export failed");
                            format!("Не удалось сохранить: {:#}", e)
                        }
                    },
                );
                Task::none()
            }
            Message::DownloadHtml => {
                self.status = Some(
                    match export::write_transcript_html(&self.export_dir, self.session.history()) {
                        Ok(path) => format!("Сохранено: {}", path.display()),
                        Err(e) => {
                            tracing::warn!(error = %e, "HTML export failed");
                            format!("Не удалось сохранить: {:#}", e)
                        }
                    },
                );
                Task::none()
            }
            Message::ClearRequested => {
                self.confirming_clear = true;
                Task::none()
            }
            Message::ClearCancelled => {
                self.confirming_clear = false;
                Task::none()
            }
            Message::ClearConfirmed => {
                self.confirming_clear = false;
                self.toggled.clear();
                self.status = None;
                if let Err(e) = self.session.clear() {
                    tracing::warn!(error = %e, "Clearing persisted history failed");
                    self.status = Some(format!("Не удалось очистить историю: {}", e));
                }
                Task::none()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.session.is_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::ClearCancelled)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        let chat = scrollable(
            Column::with_children(
                self.session
                    .pane()
                    .iter()
                    .enumerate()
                    .map(|(idx, entry)| self.view_entry(idx, entry)),
            )
            .spacing(10)
            .padding(15),
        )
        .id(self.chat_scroll.clone())
        .height(Length::Fill);

        let main = column![chat, self.view_input(), self.view_controls()]
            .spacing(10)
            .padding(10)
            .width(Length::Fill);

        let sidebar = container(
            scrollable(
                Column::with_children(
                    self.session
                        .sidebar()
                        .iter()
                        .enumerate()
                        .map(|(idx, card)| self.view_card(idx, card)),
                )
                .spacing(8)
                .padding(10),
            )
            .height(Length::Fill),
        )
        .width(Length::Fixed(SIDEBAR_WIDTH))
        .height(Length::Fill)
        .style(container::bordered_box);

        row![main, sidebar].into()
    }

    fn view_input(&self) -> Element<Message> {
        let loading = self.session.is_loading();

        let mut input = text_input("Задайте вопрос...", &self.input_text)
            .id(text_input::Id::new("question"))
            .padding(12)
            .size(16);
        if !loading {
            input = input
                .on_input(Message::InputChanged)
                .on_submit(Message::Submit);
        }

        let send_label = if loading {
            LOADING_FRAMES[self.loading_frame]
        } else {
            "Отправить"
        };
        let send = button(text(send_label).size(16))
            .padding(12)
            .on_press_maybe((!loading).then_some(Message::Submit));

        row![input, send].spacing(8).into()
    }

    fn view_controls(&self) -> Element<Message> {
        let mut controls = (if self.confirming_clear {
            row![
                text("Очистить историю переписки?").size(14),
                button(text("Да").size(14)).on_press(Message::ClearConfirmed),
                button(text("Отмена").size(14))
                    .style(button::secondary)
                    .on_press(Message::ClearCancelled),
            ]
        } else {
            row![
                button(text("Скачать историю").size(14)).on_press(Message::Download),
                button(text("Скачать HTML").size(14)).on_press(Message::DownloadHtml),
                button(text("Очистить историю").size(14))
                    .style(button::danger)
                    .on_press(Message::ClearRequested),
            ]
        })
        .spacing(8)
        .align_y(alignment::Vertical::Center);

        if let Some(status) = &self.status {
            controls = controls.push(text(status).size(12).color(META_COLOR));
        }

        controls.into()
    }

    fn view_entry<'a>(&'a self, idx: usize, entry: &'a ChatEntry) -> Element<'a, Message> {
        match entry {
            ChatEntry::UserText(content) => container(
                container(text(content).size(15))
                    .padding(10)
                    .max_width(640)
                    .style(container::rounded_box),
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right)
            .into(),
            ChatEntry::BotMarkdown {
                blocks, sql_note, ..
            } => {
                let mut bubble = Column::with_children(blocks.iter().map(view_block)).spacing(6);
                if *sql_note {
                    bubble = bubble.push(text(render::SQL_NOTE).size(12).color(META_COLOR));
                }
                container(bubble)
                    .padding(10)
                    .max_width(760)
                    .style(container::rounded_box)
                    .into()
            }
            ChatEntry::Preview(section) => container(self.view_preview(Fold::Pane(idx), section))
                .padding(10)
                .max_width(760)
                .style(container::rounded_box)
                .into(),
            ChatEntry::Error(message) => container(text(message).size(14).style(text::danger))
                .padding(10)
                .style(container::rounded_box)
                .into(),
        }
    }

    fn view_preview<'a>(&'a self, fold: Fold, section: &'a PreviewSection) -> Element<'a, Message> {
        let open = self.is_open(fold);
        let mut body = column![fold_header(render::PREVIEW_TITLE, open, fold)].spacing(6);
        if open {
            body = body.push(match section {
                PreviewSection::Table(table) => view_table(table),
                PreviewSection::NoData => text(NO_DATA_NOTICE).size(12).color(META_COLOR).into(),
            });
        }
        body.into()
    }

    fn view_card<'a>(&'a self, idx: usize, card: &'a SidebarCard) -> Element<'a, Message> {
        let mut body = column![text(&card.headline).size(14)].spacing(6);

        if let Some(sql) = &card.sql {
            for (section, title, sql_text) in [
                (Section::SqlRaw, render::SQL_RAW_TITLE, &sql.raw),
                (Section::SqlExpanded, render::SQL_EXPANDED_TITLE, &sql.expanded),
            ] {
                let fold = Fold::Sidebar(idx, section);
                let open = self.is_open(fold);
                body = body.push(fold_header(title, open, fold));
                if open {
                    body = body.push(
                        container(text(sql_text).size(12).font(Font::MONOSPACE))
                            .padding(6)
                            .style(container::bordered_box),
                    );
                }
            }
        }

        if let Some(section) = &card.preview {
            body = body.push(self.view_preview(Fold::Sidebar(idx, Section::Preview), section));
        }

        body = body.push(text(&card.meta).size(11).color(META_COLOR));

        container(body)
            .padding(8)
            .width(Length::Fill)
            .style(container::rounded_box)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn fold_header<'a>(title: &'a str, open: bool, fold: Fold) -> Element<'a, Message> {
    let arrow = if open { "▾" } else { "▸" };
    button(text(format!("{} {}", arrow, title)).size(12))
        .padding(2)
        .style(button::text)
        .on_press(Message::Toggle(fold))
        .into()
}

fn view_table(table: &PreviewTable) -> Element<'_, Message> {
    let bold = Font {
        weight: font::Weight::Bold,
        ..Font::DEFAULT
    };

    let header = Row::with_children(table.columns.iter().map(|c| {
        text(c)
            .size(12)
            .font(bold)
            .width(Length::FillPortion(1))
            .into()
    }))
    .spacing(6);

    let mut rows = column![header, horizontal_rule(1)].spacing(4);
    for row_cells in &table.rows {
        rows = rows.push(
            Row::with_children(row_cells.iter().map(|cell| {
                text(cell)
                    .size(12)
                    .width(Length::FillPortion(1))
                    .into()
            }))
            .spacing(6),
        );
    }
    rows.into()
}

fn view_block(block: &Block) -> Element<'_, Message> {
    match block {
        Block::Heading(level, content) => {
            let size = (24.0 - 2.0 * f32::from(*level)).max(15.0);
            text(content)
                .size(size)
                .font(Font {
                    weight: font::Weight::Bold,
                    ..Font::DEFAULT
                })
                .into()
        }
        Block::Paragraph(content) => text(content).size(15).into(),
        Block::Quote(content) => row![text("│").size(15).color(META_COLOR), text(content).size(15)]
            .spacing(6)
            .into(),
        Block::ListItem {
            depth,
            marker,
            text: content,
        } => text(format!("{}{} {}", "    ".repeat(*depth), marker, content))
            .size(15)
            .into(),
        Block::Code(code) => container(text(code).size(13).font(Font::MONOSPACE))
            .padding(8)
            .width(Length::Fill)
            .style(container::bordered_box)
            .into(),
        Block::Rule => horizontal_rule(1).into(),
    }
}
