use crate::markdown::{self, Block, SafeHtml};
use crate::preview::{PreviewSection, PreviewTable, NO_DATA_NOTICE};
use crate::turn::{non_empty, History, Role, Turn};

pub const SQL_NOTE: &str = "См. SQL ниже в истории";
pub const PREVIEW_TITLE: &str = "Предварительный просмотр строк";
pub const SQL_RAW_TITLE: &str = "SQL (raw)";
pub const SQL_EXPANDED_TITLE: &str = "SQL (expanded)";
pub const SQL_PLACEHOLDER: &str = "—";
pub const USER_PREFIX: &str = "Вы: ";
pub const BOT_PREFIX: &str = "Бот: ";
pub const ERROR_PREFIX: &str = "Ошибка при отправке запроса: ";

const SIDEBAR_TRUNCATE: usize = 120;

/// One node in the live chat pane.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEntry {
    UserText(String),
    BotMarkdown {
        blocks: Vec<Block>,
        html: SafeHtml,
        sql_note: bool,
    },
    Preview(PreviewSection),
    /// Shown once, never persisted.
    Error(String),
}

impl ChatEntry {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ChatEntry::Error(format!("{}{}", ERROR_PREFIX, message))
    }
}

/// Nodes appended to the pane for one turn, in display order.
pub fn chat_entries(turn: &Turn) -> Vec<ChatEntry> {
    let mut entries = Vec::with_capacity(2);
    match turn.role {
        Role::User => entries.push(ChatEntry::UserText(turn.content.clone())),
        Role::Bot => entries.push(ChatEntry::BotMarkdown {
            blocks: markdown::to_blocks(&turn.content),
            html: markdown::to_safe_html(&turn.content),
            sql_note: turn.has_sql(),
        }),
    }
    if let Some(section) = preview_section(turn) {
        entries.push(ChatEntry::Preview(section));
    }
    entries
}

pub fn preview_section(turn: &Turn) -> Option<PreviewSection> {
    turn.rows_preview
        .as_ref()
        .map(|raw| PreviewSection::from_raw(raw, turn.columns.as_deref()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlSections {
    pub raw: String,
    pub expanded: String,
}

/// One card of the sidebar history panel.
#[derive(Debug, Clone, PartialEq)]
pub struct SidebarCard {
    pub role: Role,
    pub headline: String,
    pub sql: Option<SqlSections>,
    pub preview: Option<PreviewSection>,
    pub meta: String,
}

impl SidebarCard {
    pub fn from_turn(turn: &Turn) -> Self {
        let headline = match turn.role {
            Role::User => format!("{}{}", USER_PREFIX, turn.content),
            Role::Bot => format!("{}{}", BOT_PREFIX, truncate(&turn.content, SIDEBAR_TRUNCATE)),
        };

        let sql = turn.has_sql().then(|| SqlSections {
            raw: non_empty(&turn.sql_text_raw).unwrap_or(SQL_PLACEHOLDER).to_string(),
            expanded: non_empty(&turn.sql_text_expanded)
                .unwrap_or(SQL_PLACEHOLDER)
                .to_string(),
        });

        let mut meta = turn.timestamp.clone();
        if let Some(count) = turn.rows_count {
            meta.push_str(&format!(" • rows: {}", count));
        }

        SidebarCard {
            role: turn.role,
            headline,
            sql,
            preview: preview_section(turn),
            meta,
        }
    }
}

/// Full rebuild of the sidebar from the whole history.
pub fn sidebar(history: &History) -> Vec<SidebarCard> {
    history.turns().iter().map(SidebarCard::from_turn).collect()
}

pub fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        let mut out: String = s.chars().take(n).collect();
        out.push('…');
        out
    } else {
        s.to_string()
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // Writing into a String cannot fail.
    let _ = pulldown_cmark::escape::escape_html(&mut out, s);
    out
}

/// HTML for one chat-pane node. Only the bot bubble carries markup, and that
/// comes from [`SafeHtml`].
pub fn entry_html(entry: &ChatEntry) -> String {
    match entry {
        ChatEntry::UserText(text) => format!(
            "<div class=\"message user\"><div class=\"bubble\">{}</div></div>\n",
            escape_html(text)
        ),
        ChatEntry::BotMarkdown { html, sql_note, .. } => {
            let mut out = format!(
                "<div class=\"message bot\"><div class=\"bubble\">{}</div>",
                html.as_str()
            );
            if *sql_note {
                out.push_str(&format!("<div class=\"meta\">{}</div>", escape_html(SQL_NOTE)));
            }
            out.push_str("</div>\n");
            out
        }
        ChatEntry::Preview(section) => format!(
            "<div class=\"message bot\"><div class=\"bubble\">{}</div></div>\n",
            preview_html(section)
        ),
        ChatEntry::Error(text) => format!(
            "<div class=\"message bot error\"><div class=\"bubble\">{}</div></div>\n",
            escape_html(text)
        ),
    }
}

fn preview_html(section: &PreviewSection) -> String {
    let body = match section {
        PreviewSection::Table(table) => table_html(table),
        PreviewSection::NoData => format!("<div class=\"meta\">{}</div>", escape_html(NO_DATA_NOTICE)),
    };
    format!(
        "<details open><summary>{}</summary>{}</details>",
        escape_html(PREVIEW_TITLE),
        body
    )
}

fn table_html(table: &PreviewTable) -> String {
    let mut out = String::from("<table><thead><tr>");
    for column in &table.columns {
        out.push_str(&format!("<th>{}</th>", escape_html(column)));
    }
    out.push_str("</tr></thead><tbody>");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}
