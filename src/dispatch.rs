use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::preview::cell_text;
use crate::turn::{non_empty, History, Role, Turn};

/// Prior turns sent along with each question.
pub const CONTEXT_TURNS: usize = 4;

pub const NO_ANSWER: &str = "Нет ответа.";

const ACCESS_CODE_HEADER: &str = "X-Access-Code";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AskRequest {
    pub question: String,
    pub history: Vec<ContextMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sql_text_raw: Option<String>,
    #[serde(default)]
    pub sql_text_expanded: Option<String>,
    #[serde(default)]
    pub rows_preview: Option<Value>,
    #[serde(default)]
    pub columns: Option<Vec<Value>>,
    #[serde(default)]
    pub rows_count: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl AskResponse {
    fn has_rows_preview(&self) -> bool {
        match &self.rows_preview {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// SQL text or a row preview came back, so the answer keeps its data context.
    pub fn carries_data(&self) -> bool {
        non_empty(&self.sql_text_raw).is_some()
            || non_empty(&self.sql_text_expanded).is_some()
            || self.has_rows_preview()
    }

    /// Normalizes the response into the bot turn that gets stored.
    pub fn into_bot_turn(self, timestamp: impl Into<String>) -> Turn {
        let content = non_empty(&self.answer).unwrap_or(NO_ANSWER).to_string();
        let mut turn = Turn::bot(content, timestamp);

        if self.carries_data() {
            let has_rows = self.has_rows_preview();
            turn.sql_text_raw = self.sql_text_raw.filter(|s| !s.is_empty());
            turn.sql_text_expanded = self.sql_text_expanded.filter(|s| !s.is_empty());
            turn.rows_preview = if has_rows { self.rows_preview } else { None };
            turn.columns = self
                .columns
                .map(|cols| cols.iter().map(cell_text).collect());
            turn.rows_count = self.rows_count;
            turn.mode = self.mode.filter(|s| !s.is_empty());
        }

        turn
    }
}

/// Last [`CONTEXT_TURNS`] turns as role/content pairs, then the new question.
pub fn build_request(question: &str, history: &History) -> AskRequest {
    let mut context: Vec<ContextMessage> = history
        .tail(CONTEXT_TURNS)
        .iter()
        .map(|turn| ContextMessage {
            role: turn.role,
            content: turn.content.clone(),
        })
        .collect();
    context.push(ContextMessage {
        role: Role::User,
        content: question.to_string(),
    });

    AskRequest {
        question: question.to_string(),
        history: context,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    api_url: String,
    access_code: String,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn with_config(api_url: String, access_code: String) -> Self {
        Dispatcher {
            api_url,
            access_code,
            client: reqwest::Client::new(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// One POST, no retries.
    pub async fn send(&self, request: &AskRequest) -> Result<AskResponse, DispatchError> {
        tracing::info!(
            url = %self.api_url,
            context_len = request.history.len(),
            "Sending question"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header(ACCESS_CODE_HEADER, &self.access_code)
            .json(request)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Backend rejected question");
            return Err(DispatchError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let parsed: AskResponse =
            serde_json::from_slice(&body).map_err(|e| DispatchError::Decode(e.to_string()))?;

        tracing::info!(
            has_answer = parsed.answer.is_some(),
            carries_data = parsed.carries_data(),
            rows_count = ?parsed.rows_count,
            "Answer received"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(value: Value) -> AskResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_with_empty_history() {
        let request = build_request("What is X?", &History::new());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "question": "What is X?",
                "history": [{"role": "user", "content": "What is X?"}]
            })
        );
    }

    #[test]
    fn test_request_keeps_last_four_turns() {
        let mut history = History::new();
        for i in 0..3 {
            history.push(Turn::user(format!("q{}", i), "t"));
            let mut bot = Turn::bot(format!("a{}", i), "t");
            bot.sql_text_raw = Some("SELECT 1".to_string());
            history.push(bot);
        }

        let request = build_request("next", &history);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["history"],
            json!([
                {"role": "user", "content": "q1"},
                {"role": "bot", "content": "a1"},
                {"role": "user", "content": "q2"},
                {"role": "bot", "content": "a2"},
                {"role": "user", "content": "next"}
            ])
        );
    }

    #[test]
    fn test_answer_only_response_stays_compact() {
        let turn = parse(json!({"answer": "X is Y"})).into_bot_turn("t");
        assert_eq!(turn.content, "X is Y");
        assert_eq!(turn.role, Role::Bot);
        assert_eq!(turn, Turn::bot("X is Y", "t"));
    }

    #[test]
    fn test_missing_answer_uses_placeholder() {
        assert_eq!(parse(json!({})).into_bot_turn("t").content, NO_ANSWER);
        assert_eq!(parse(json!({"answer": ""})).into_bot_turn("t").content, NO_ANSWER);
        assert_eq!(parse(json!({"answer": null})).into_bot_turn("t").content, NO_ANSWER);
    }

    #[test]
    fn test_rows_count_without_trigger_is_dropped() {
        let turn = parse(json!({"answer": "a", "rows_count": 3, "mode": "history"}))
            .into_bot_turn("t");
        assert_eq!(turn.rows_count, None);
        assert_eq!(turn.mode, None);
    }

    #[test]
    fn test_sql_response_absorbs_all_fields() {
        let turn = parse(json!({
            "answer": "Отток 5%",
            "sql_text_raw": "SELECT f{Отток}",
            "sql_text_expanded": "SELECT SUM(x)/SUM(y)",
            "rows_preview": [{"БЕ": "Юг", "Отток": 0.05}],
            "columns": ["БЕ", "Отток"],
            "rows_count": 1,
            "mode": "sql"
        }))
        .into_bot_turn("t");

        assert_eq!(turn.sql_text_raw.as_deref(), Some("SELECT f{Отток}"));
        assert_eq!(turn.sql_text_expanded.as_deref(), Some("SELECT SUM(x)/SUM(y)"));
        assert_eq!(turn.rows_preview, Some(json!([{"БЕ": "Юг", "Отток": 0.05}])));
        assert_eq!(turn.columns, Some(vec!["БЕ".to_string(), "Отток".to_string()]));
        assert_eq!(turn.rows_count, Some(1));
        assert_eq!(turn.mode.as_deref(), Some("sql"));
    }

    #[test]
    fn test_rows_preview_alone_triggers_absorption() {
        let turn = parse(json!({"answer": "a", "rows_preview": "[{\"a\":1}]", "rows_count": 1}))
            .into_bot_turn("t");
        assert_eq!(turn.rows_preview, Some(json!("[{\"a\":1}]")));
        assert_eq!(turn.rows_count, Some(1));
        assert_eq!(turn.sql_text_raw, None);
    }

    #[test]
    fn test_empty_sql_strings_do_not_trigger() {
        let response = parse(json!({"answer": "a", "sql_text_raw": "", "rows_preview": null}));
        assert!(!response.carries_data());
    }

    #[test]
    fn test_numeric_columns_are_stringified() {
        let turn = parse(json!({"sql_text_raw": "SELECT 1", "columns": [1, "b"]}))
            .into_bot_turn("t");
        assert_eq!(turn.columns, Some(vec!["1".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_send_posts_question_with_access_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .and(header("X-Access-Code", "777"))
            .and(body_json(json!({
                "question": "What is X?",
                "history": [{"role": "user", "content": "What is X?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "X is Y"})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::with_config(format!("{}/ask", server.uri()), "777".to_string());
        let request = build_request("What is X?", &History::new());
        let response = dispatcher.send(&request).await.unwrap();
        assert_eq!(response.answer.as_deref(), Some("X is Y"));
    }

    #[tokio::test]
    async fn test_send_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "denied"})))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::with_config(format!("{}/ask", server.uri()), String::new());
        let err = dispatcher
            .send(&build_request("q", &History::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Status(status) if status.as_u16() == 401));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_send_rejects_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::with_config(server.uri(), String::new());
        let err = dispatcher
            .send(&build_request("q", &History::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_send_reports_transport_failure() {
        let dispatcher =
            Dispatcher::with_config("http://127.0.0.1:9/ask".to_string(), String::new());
        let err = dispatcher
            .send(&build_request("q", &History::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
