use pulldown_cmark::{html, Event, Options, Parser, Tag};

/// HTML that has been through the sanitizer. Only [`to_safe_html`] builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Markdown to sanitized HTML. Parsing and sanitizing are one step; there is
/// no way to get the unsanitized HTML out of here.
pub fn to_safe_html(markdown: &str) -> SafeHtml {
    // Single newlines inside a paragraph are kept as line breaks.
    let events = Parser::new_ext(markdown, options()).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut raw = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut raw, events);

    SafeHtml(ammonia::clean(&raw))
}

/// Display blocks for the native chat pane.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(u8, String),
    Paragraph(String),
    Quote(String),
    ListItem {
        depth: usize,
        marker: String,
        text: String,
    },
    Code(String),
    Rule,
}

/// Flattens markdown into blocks. Raw HTML in the source stays literal text.
pub fn to_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut buf = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut items: Vec<OpenItem> = Vec::new();
    let mut heading: Option<u8> = None;
    let mut quote_depth = 0usize;
    let mut in_code = false;
    let mut in_text = false;
    let mut loose_html = false;

    for event in Parser::new_ext(markdown, options()) {
        // An HTML block ends where the next block starts.
        if loose_html && matches!(event, Event::Start(_) | Event::End(_) | Event::Rule) {
            loose_html = false;
            push_loose(&mut blocks, &mut buf, quote_depth);
        }

        match event {
            Event::Start(Tag::Heading(level, ..)) => {
                heading = Some(level as u8);
                in_text = true;
            }
            Event::End(Tag::Heading(..)) => {
                in_text = false;
                let level = heading.take().unwrap_or(1);
                blocks.push(Block::Heading(level, take_trimmed(&mut buf)));
            }
            Event::Start(Tag::BlockQuote) => quote_depth += 1,
            Event::End(Tag::BlockQuote) => quote_depth = quote_depth.saturating_sub(1),
            Event::Start(Tag::Paragraph) => in_text = true,
            Event::End(Tag::Paragraph) => {
                in_text = false;
                if !items.is_empty() {
                    buf.push('\n');
                } else if quote_depth > 0 {
                    blocks.push(Block::Quote(take_trimmed(&mut buf)));
                } else {
                    blocks.push(Block::Paragraph(take_trimmed(&mut buf)));
                }
            }
            Event::Start(Tag::CodeBlock(_)) => in_code = true,
            Event::End(Tag::CodeBlock(_)) => {
                in_code = false;
                let code = std::mem::take(&mut buf);
                blocks.push(Block::Code(code.trim_end_matches('\n').to_string()));
            }
            Event::Start(Tag::List(start)) => {
                flush_item(&mut blocks, &mut buf, items.last_mut());
                lists.push(start);
            }
            Event::End(Tag::List(_)) => {
                lists.pop();
            }
            Event::Start(Tag::Item) => {
                let marker = match lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}.", n);
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                items.push(OpenItem {
                    depth: lists.len().saturating_sub(1),
                    marker,
                });
            }
            Event::End(Tag::Item) => {
                flush_item(&mut blocks, &mut buf, items.last_mut());
                items.pop();
            }
            Event::Start(Tag::TableCell) => in_text = true,
            Event::End(Tag::TableCell) => {
                in_text = false;
                buf.push_str(" | ");
            }
            Event::End(Tag::TableHead) | Event::End(Tag::TableRow) => {
                let row = take_trimmed(&mut buf);
                blocks.push(Block::Paragraph(row.trim_end_matches('|').trim_end().to_string()));
            }
            Event::Text(text) => buf.push_str(&text),
            Event::Code(code) => {
                buf.push('`');
                buf.push_str(&code);
                buf.push('`');
            }
            Event::Html(raw) => {
                if !in_text && !in_code && items.is_empty() {
                    loose_html = true;
                }
                buf.push_str(&raw);
            }
            Event::SoftBreak | Event::HardBreak => buf.push('\n'),
            Event::Rule => blocks.push(Block::Rule),
            Event::TaskListMarker(done) => buf.push_str(if done { "[x] " } else { "[ ] " }),
            Event::FootnoteReference(name) => {
                buf.push_str("[^");
                buf.push_str(&name);
                buf.push(']');
            }
            _ => {}
        }
    }

    if !in_code && !buf.trim().is_empty() {
        push_loose(&mut blocks, &mut buf, quote_depth);
    }

    blocks
}

/// A list item that has started but not ended yet.
struct OpenItem {
    depth: usize,
    marker: String,
}

/// Emits the text gathered so far for the innermost open item. Text that
/// follows a nested list is emitted again at the item's depth without a marker.
fn flush_item(blocks: &mut Vec<Block>, buf: &mut String, item: Option<&mut OpenItem>) {
    if let Some(item) = item {
        if !buf.trim().is_empty() {
            blocks.push(Block::ListItem {
                depth: item.depth,
                marker: std::mem::take(&mut item.marker),
                text: take_trimmed(buf),
            });
        }
    }
}

fn push_loose(blocks: &mut Vec<Block>, buf: &mut String, quote_depth: usize) {
    let text = take_trimmed(buf);
    if text.is_empty() {
        return;
    }
    if quote_depth > 0 {
        blocks.push(Block::Quote(text));
    } else {
        blocks.push(Block::Paragraph(text));
    }
}

fn take_trimmed(buf: &mut String) -> String {
    let text = buf.trim().to_string();
    buf.clear();
    text
}
