use std::time::Duration;

use chrono::DateTime;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{AppError, Result};
use crate::model::{Attachment, ChatKind, ChatRef, Message};

const MESSAGES_METHOD: &str = "im.dialog.messages.get";
const RECENT_METHOD: &str = "im.recent.get";
const USER_METHOD: &str = "user.get";

/// Paging position for a messages request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Skip this many messages
    Offset(usize),
    /// Only messages older than this id; `None` asks for the newest page
    Before(Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub cursor: Cursor,
}

/// Raw page as returned by the messages endpoint.
/// `messages` is `None` when the response carried no message list at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub messages: Option<Vec<Value>>,
}

/// Source of message pages for a dialog
pub trait MessageSource {
    fn fetch_page(&self, dialog_id: &str, request: &PageRequest) -> Result<Page>;
}

/// Chat listing and user lookup
pub trait Directory {
    fn recent_chats(&self) -> Result<Vec<ChatRef>>;
    fn user_name(&self, user_id: &str) -> Result<Option<String>>;
}

/// Blocking client for the portal's REST webhook
pub struct PortalClient {
    base: Url,
    http: reqwest::blocking::Client,
}

impl PortalClient {
    pub fn new(webhook: &str, timeout: Duration) -> Result<Self> {
        // Method names are joined onto the webhook, so it has to end in '/'
        let normalized = if webhook.ends_with('/') {
            webhook.to_string()
        } else {
            format!("{}/", webhook)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| AppError::InvalidInput(format!("webhook URL {}: {}", webhook, e)))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;
        Ok(Self { base, http })
    }

    pub fn method_url(&self, method: &str) -> Result<Url> {
        self.base
            .join(&format!("{}.json", method))
            .map_err(|e| AppError::InvalidInput(format!("method {}: {}", method, e)))
    }

    fn call(&self, method: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut url = self.method_url(method)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        debug!(method, ?query, "calling portal");

        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| AppError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                method: method.to_string(),
            });
        }

        let body = response.text().map_err(|e| AppError::Http(e.to_string()))?;
        parse_response(&body)
    }
}

impl MessageSource for PortalClient {
    fn fetch_page(&self, dialog_id: &str, request: &PageRequest) -> Result<Page> {
        let body = self.call(MESSAGES_METHOD, &messages_query(dialog_id, request))?;
        Ok(page_from_response(&body))
    }
}

impl Directory for PortalClient {
    fn recent_chats(&self) -> Result<Vec<ChatRef>> {
        let body = self.call(RECENT_METHOD, &[])?;
        Ok(chats_from_response(&body))
    }

    fn user_name(&self, user_id: &str) -> Result<Option<String>> {
        let body = self.call(USER_METHOD, &[("ID", user_id.to_string())])?;
        Ok(user_name_from_response(&body))
    }
}

pub fn messages_query(dialog_id: &str, request: &PageRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("DIALOG_ID", dialog_id.to_string()),
        ("LIMIT", request.limit.to_string()),
    ];
    match request.cursor {
        Cursor::Offset(offset) => {
            query.push(("OFFSET", offset.to_string()));
            query.push(("SORT", "ASC".to_string()));
        }
        Cursor::Before(Some(last_id)) => query.push(("LAST_ID", last_id.to_string())),
        Cursor::Before(None) => {}
    }
    query
}

/// Decode a webhook response body, turning `{"error": ..}` payloads into errors
pub fn parse_response(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body).map_err(|e| AppError::JsonParse(e.to_string()))?;

    if let Some(code) = value.get("error") {
        let code = match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let description = value
            .get("error_description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string();
        return Err(AppError::Api { code, description });
    }

    Ok(value)
}

pub fn page_from_response(body: &Value) -> Page {
    let messages = body
        .get("result")
        .and_then(|r| r.get("messages"))
        .and_then(|m| m.as_array())
        .cloned();
    Page { messages }
}

pub fn chats_from_response(body: &Value) -> Vec<ChatRef> {
    let Some(items) = body.get("result").and_then(|r| r.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let kind = match item.get("type").and_then(|t| t.as_str())? {
                "chat" => {
                    let entity = item
                        .get("chat")
                        .and_then(|c| c.get("entity_type"))
                        .and_then(|e| e.as_str())
                        .unwrap_or("");
                    if entity.eq_ignore_ascii_case("LINES") {
                        ChatKind::OpenLine
                    } else {
                        ChatKind::GroupChat
                    }
                }
                "user" => ChatKind::Direct,
                _ => return None,
            };

            let chat_id = match kind {
                ChatKind::Direct => id_string(item.get("id")?)?,
                _ => id_string(item.get("chat_id").or_else(|| item.get("id"))?)?,
            };
            let title = item
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string();

            Some(ChatRef {
                chat_id,
                title,
                kind,
            })
        })
        .collect()
}

pub fn user_name_from_response(body: &Value) -> Option<String> {
    let user = body.get("result")?.as_array()?.first()?;
    let first = user.get("NAME").and_then(|n| n.as_str()).unwrap_or("");
    let last = user.get("LAST_NAME").and_then(|n| n.as_str()).unwrap_or("");
    let full = format!("{} {}", first, last).trim().to_string();
    if full.is_empty() { None } else { Some(full) }
}

/// Decode one raw message record.
/// Fails with `MalformedRecord` when `id` or `date` is missing or unusable.
pub fn decode_message(raw: &Value) -> Result<Message> {
    let id = raw.get("id").and_then(as_i64).ok_or_else(|| {
        AppError::MalformedRecord("missing or non-numeric id".to_string())
    })?;

    let date = raw
        .get("date")
        .and_then(|d| d.as_str())
        .ok_or_else(|| AppError::MalformedRecord(format!("message {} has no date", id)))?;
    let timestamp = DateTime::parse_from_rfc3339(date).map_err(|e| {
        AppError::MalformedRecord(format!("message {} has bad date {:?}: {}", id, date, e))
    })?;

    let author_id = raw
        .get("author_id")
        .and_then(id_string)
        .unwrap_or_else(|| "0".to_string());
    let text = raw
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    let mut attachments = Vec::new();
    if let Some(file) = raw.get("file").filter(|f| f.is_object()) {
        attachments.extend(decode_attachment(file));
    }
    if let Some(files) = raw.get("files").and_then(|f| f.as_array()) {
        attachments.extend(files.iter().filter_map(decode_attachment));
    }

    Ok(Message {
        id,
        timestamp,
        author_id,
        text,
        attachments,
    })
}

fn decode_attachment(file: &Value) -> Option<Attachment> {
    let name = file.get("name").and_then(|n| n.as_str())?.to_string();
    let kind = file
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("file")
        .to_string();
    let size = file.get("size").and_then(|s| s.as_u64()).unwrap_or(0);
    let url = ["urlPreview", "urlDownload", "urlShow"]
        .iter()
        .find_map(|key| file.get(*key).and_then(|u| u.as_str()))
        .unwrap_or("")
        .to_string();
    Some(Attachment {
        name,
        kind,
        size,
        url,
    })
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_url_joins_webhook() {
        let client =
            PortalClient::new("https://portal.example/rest/1/secret", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.method_url("im.recent.get").unwrap().as_str(),
            "https://portal.example/rest/1/secret/im.recent.get.json"
        );

        let client =
            PortalClient::new("https://portal.example/rest/1/secret/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.method_url("user.get").unwrap().as_str(),
            "https://portal.example/rest/1/secret/user.get.json"
        );
    }

    #[test]
    fn test_new_rejects_invalid_webhook() {
        let result = PortalClient::new("not a url", Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_messages_query_offset_mode() {
        let query = messages_query(
            "chat12",
            &PageRequest {
                limit: 50,
                cursor: Cursor::Offset(100),
            },
        );
        assert!(query.contains(&("DIALOG_ID", "chat12".to_string())));
        assert!(query.contains(&("LIMIT", "50".to_string())));
        assert!(query.contains(&("OFFSET", "100".to_string())));
        assert!(query.contains(&("SORT", "ASC".to_string())));
    }

    #[test]
    fn test_messages_query_cursor_mode() {
        let first = messages_query(
            "chat12",
            &PageRequest {
                limit: 20,
                cursor: Cursor::Before(None),
            },
        );
        assert!(!first.iter().any(|(k, _)| *k == "LAST_ID"));
        assert!(!first.iter().any(|(k, _)| *k == "OFFSET"));

        let next = messages_query(
            "chat12",
            &PageRequest {
                limit: 20,
                cursor: Cursor::Before(Some(981)),
            },
        );
        assert!(next.contains(&("LAST_ID", "981".to_string())));
    }

    #[test]
    fn test_parse_response_error_payload() {
        let result = parse_response(
            r#"{"error":"ACCESS_DENIED","error_description":"Access denied!"}"#,
        );
        match result {
            Err(AppError::Api { code, description }) => {
                assert_eq!(code, "ACCESS_DENIED");
                assert_eq!(description, "Access denied!");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_invalid_json() {
        assert!(matches!(parse_response("<html>"), Err(AppError::JsonParse(_))));
    }

    #[test]
    fn test_page_from_response() {
        let body = json!({"result": {"messages": [{"id": 1}, {"id": 2}], "users": []}});
        let page = page_from_response(&body);
        assert_eq!(page.messages.map(|m| m.len()), Some(2));

        let missing = page_from_response(&json!({"result": {"users": []}}));
        assert!(missing.messages.is_none());
    }

    #[test]
    fn test_chats_from_response() {
        let body = json!({"result": [
            {"type": "chat", "chat_id": 10, "title": "Team", "chat": {"entity_type": ""}},
            {"type": "chat", "chat_id": 11, "title": "Support", "chat": {"entity_type": "lines"}},
            {"type": "user", "id": 7, "title": "Anna Petrova"},
            {"type": "notification", "id": 1, "title": "ignored"},
            {"type": "chat", "title": "no id"}
        ]});

        let chats = chats_from_response(&body);
        assert_eq!(chats.len(), 3);
        assert_eq!(chats[0].chat_id, "10");
        assert_eq!(chats[0].kind, ChatKind::GroupChat);
        assert_eq!(chats[1].kind, ChatKind::OpenLine);
        assert_eq!(chats[1].title, "Support");
        assert_eq!(chats[2].chat_id, "7");
        assert_eq!(chats[2].kind, ChatKind::Direct);
    }

    #[test]
    fn test_chats_from_response_chat_without_entity() {
        let body = json!({"result": [{"type": "chat", "chat_id": "3", "title": "Ops"}]});
        let chats = chats_from_response(&body);
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].kind, ChatKind::GroupChat);
    }

    #[test]
    fn test_user_name_from_response() {
        let body = json!({"result": [{"NAME": "Anna", "LAST_NAME": "Petrova"}]});
        assert_eq!(user_name_from_response(&body), Some("Anna Petrova".to_string()));

        let only_first = json!({"result": [{"NAME": "Anna", "LAST_NAME": ""}]});
        assert_eq!(user_name_from_response(&only_first), Some("Anna".to_string()));

        assert_eq!(user_name_from_response(&json!({"result": []})), None);
        assert_eq!(
            user_name_from_response(&json!({"result": [{"NAME": "", "LAST_NAME": ""}]})),
            None
        );
    }

    #[test]
    fn test_decode_message_full() {
        let raw = json!({
            "id": "120",
            "date": "2024-01-31T18:00:00+03:00",
            "author_id": 7,
            "text": "see attached",
            "file": {"name": "plan.xlsx", "type": "file", "size": 2048, "urlPreview": "https://portal.example/f/1"}
        });

        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.id, 120);
        assert_eq!(msg.author_id, "7");
        assert_eq!(msg.text, "see attached");
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-01-31T18:00:00+03:00");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].name, "plan.xlsx");
        assert_eq!(msg.attachments[0].size, 2048);
        assert_eq!(msg.attachments[0].url, "https://portal.example/f/1");
    }

    #[test]
    fn test_decode_message_defaults() {
        let raw = json!({"id": 5, "date": "2024-01-01T00:00:00+00:00", "file": false});
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.author_id, "0");
        assert_eq!(msg.text, "");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_decode_message_rejects_missing_fields() {
        assert!(matches!(
            decode_message(&json!({"date": "2024-01-01T00:00:00+00:00"})),
            Err(AppError::MalformedRecord(_))
        ));
        assert!(decode_message(&json!({"id": "abc", "date": "2024-01-01T00:00:00+00:00"})).is_err());
        assert!(decode_message(&json!({"id": 3})).is_err());
        assert!(decode_message(&json!({"id": 3, "date": "yesterday"})).is_err());
    }
}
