use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::render::{self, escape_html};
use crate::turn::{non_empty, History, Role};

pub const TRANSCRIPT_FILE: &str = "история_общения.txt";
pub const TRANSCRIPT_HTML_FILE: &str = "история_общения.html";

const USER_LABEL: &str = "Пользователь";
const BOT_LABEL: &str = "Бот";

/// Human-readable transcript of the whole history.
pub fn transcript(history: &History) -> String {
    let mut text = String::new();
    for turn in history.turns() {
        match turn.role {
            Role::User => {
                let _ = writeln!(text, "{} [{}]: {}", USER_LABEL, turn.timestamp, turn.content);
            }
            Role::Bot => {
                let _ = writeln!(text, "{} [{}]: {}", BOT_LABEL, turn.timestamp, turn.content);
                if let Some(sql) = non_empty(&turn.sql_text_raw) {
                    let _ = writeln!(text, "--- SQL (raw) ---\n{}", sql);
                }
                if let Some(sql) = non_empty(&turn.sql_text_expanded) {
                    let _ = writeln!(text, "--- SQL (expanded) ---\n{}", sql);
                }
                if let Some(count) = turn.rows_count {
                    let _ = writeln!(text, "rows_count: {}", count);
                }
            }
        }
        text.push('\n');
    }
    text
}

const HTML_STYLE: &str = "body{font-family:sans-serif;max-width:860px;margin:2em auto}\
.message{margin:.6em 0}.user .bubble{background:#e8f0fe}.bot .bubble{background:#f4f4f4}\
.bubble{padding:.6em .9em;border-radius:8px}.meta{color:#777;font-size:.85em}\
.error .bubble{background:#fdecea}table{border-collapse:collapse}\
td,th{border:1px solid #ccc;padding:2px 6px}";

/// The whole history as a standalone page of chat-pane entries.
pub fn transcript_html(history: &History) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    let _ = write!(
        html,
        "<title>{}</title><style>{}</style></head><body>\n",
        escape_html(TRANSCRIPT_HTML_FILE),
        HTML_STYLE
    );
    for turn in history.turns() {
        let _ = writeln!(html, "<div class=\"meta\">{}</div>", escape_html(&turn.timestamp));
        for entry in render::chat_entries(turn) {
            html.push_str(&render::entry_html(&entry));
        }
    }
    html.push_str("</body></html>\n");
    html
}

pub fn write_transcript(dir: &Path, history: &History) -> Result<PathBuf> {
    write_file(dir, TRANSCRIPT_FILE, &transcript(history))
}

pub fn write_transcript_html(dir: &Path, history: &History) -> Result<PathBuf> {
    write_file(dir, TRANSCRIPT_HTML_FILE, &transcript_html(history))
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "Transcript exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Turn;

    #[test]
    fn test_transcript_with_rows_count_and_no_sql() {
        let mut bot = Turn::bot("X is Y", "t2");
        bot.rows_count = Some(3);
        let history = History::from_turns(vec![Turn::user("What is X?", "t1"), bot]);

        let text = transcript(&history);
        assert_eq!(
            text,
            "Пользователь [t1]: What is X?\n\nБот [t2]: X is Y\nrows_count: 3\n\n"
        );
        assert!(!text.contains("--- SQL"));
    }

    #[test]
    fn test_transcript_with_sql_blocks() {
        let mut bot = Turn::bot("ok", "t");
        bot.sql_text_raw = Some("SELECT f{Отток}".to_string());
        bot.sql_text_expanded = Some("SELECT SUM(a)".to_string());
        let text = transcript(&History::from_turns(vec![bot]));
        assert_eq!(
            text,
            "Бот [t]: ok\n--- SQL (raw) ---\nSELECT f{Отток}\n--- SQL (expanded) ---\nSELECT SUM(a)\n\n"
        );
    }

    #[test]
    fn test_empty_history_transcript_is_empty() {
        assert_eq!(transcript(&History::new()), "");
    }

    #[test]
    fn test_html_transcript_escapes_and_sanitizes() {
        let history = History::from_turns(vec![
            Turn::user("<i>q</i>", "t1"),
            Turn::bot("**bold**\n\n<script>x()</script>", "t2"),
        ]);
        let html = transcript_html(&history);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("&lt;i&gt;q&lt;/i&gt;"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_write_transcript_uses_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::from_turns(vec![Turn::user("q", "t")]);
        let path = write_transcript(dir.path(), &history).unwrap();
        assert_eq!(path.file_name().unwrap(), TRANSCRIPT_FILE);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "Пользователь [t]: q\n\n");
    }
}
