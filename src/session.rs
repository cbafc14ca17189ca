use crate::dispatch::{self, AskRequest, AskResponse, DispatchError};
use crate::history::{HistoryStore, StoreError};
use crate::render::{self, ChatEntry, SidebarCard};
use crate::turn::{now_stamp, History, Turn};

const SAVE_FAILED_PREFIX: &str = "Не удалось сохранить историю: ";

/// A question that passed validation and is waiting for the backend.
#[derive(Debug, Clone)]
pub struct PendingAsk {
    pub question: String,
    pub asked_at: String,
    pub request: AskRequest,
}

/// Single owner of the conversation state: history, live pane, sidebar and
/// the in-flight flag. The UI only reads from it and reports events to it.
pub struct ChatSession {
    store: HistoryStore,
    history: History,
    pane: Vec<ChatEntry>,
    sidebar: Vec<SidebarCard>,
    loading: bool,
}

impl ChatSession {
    pub fn new(store: HistoryStore) -> Self {
        let history = store.load();
        let sidebar = render::sidebar(&history);
        ChatSession {
            store,
            history,
            pane: Vec::new(),
            sidebar,
            loading: false,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pane(&self) -> &[ChatEntry] {
        &self.pane
    }

    pub fn sidebar(&self) -> &[SidebarCard] {
        &self.sidebar
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Validates the input and enters the loading state. Returns `None` for
    /// blank input or while a request is already in flight; nothing changes
    /// in that case.
    pub fn begin(&mut self, input: &str) -> Option<PendingAsk> {
        let question = input.trim();
        if question.is_empty() || self.loading {
            return None;
        }

        let request = dispatch::build_request(question, &self.history);
        self.pane.push(ChatEntry::UserText(question.to_string()));
        self.loading = true;

        Some(PendingAsk {
            question: question.to_string(),
            asked_at: now_stamp(),
            request,
        })
    }

    /// Applies the backend outcome and always leaves the loading state.
    pub fn complete(&mut self, pending: PendingAsk, result: Result<AskResponse, DispatchError>) {
        self.loading = false;

        match result {
            Ok(response) => {
                let bot = response.into_bot_turn(now_stamp());
                self.pane.extend(render::chat_entries(&bot));
                self.history.push(Turn::user(pending.question, pending.asked_at));
                self.history.push(bot);
                self.persist();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Question failed");
                self.pane.push(ChatEntry::error(e));
            }
        }
    }

    /// Wipes history, persists the empty document and clears the pane.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.pane.clear();
        let result = self.store.clear();
        self.history = History::new();
        self.sidebar = render::sidebar(&self.history);
        tracing::info!("History cleared");
        result.map(|_| ())
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.history) {
            tracing::warn!(error = %e, "Could not save history");
            self.pane
                .push(ChatEntry::Error(format!("{}{}", SAVE_FAILED_PREFIX, e)));
        }
        self.sidebar = render::sidebar(&self.history);
    }
}
