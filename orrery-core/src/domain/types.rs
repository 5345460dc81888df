use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use orrery_session::{ContentBlock, Message, MessageContent, MessageRole, ToolCall, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Prompt,
    Resource,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Tool,
        CapabilityKind::Prompt,
        CapabilityKind::Resource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Prompt => "prompt",
            CapabilityKind::Resource => "resource",
        }
    }

    /// Key of the server capability object and of the listing array.
    pub(crate) fn collection(self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tools",
            CapabilityKind::Prompt => "prompts",
            CapabilityKind::Resource => "resources",
        }
    }

    pub(crate) fn list_method(self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tools/list",
            CapabilityKind::Prompt => "prompts/list",
            CapabilityKind::Resource => "resources/list",
        }
    }

    pub(crate) fn from_list_changed(method: &str) -> Option<Self> {
        match method {
            "notifications/tools/list_changed" => Some(CapabilityKind::Tool),
            "notifications/prompts/list_changed" => Some(CapabilityKind::Prompt),
            "notifications/resources/list_changed" => Some(CapabilityKind::Resource),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool, prompt or resource exposed by a server.
///
/// Names are unique per server only; the same name from two servers is two
/// descriptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    pub kind: CapabilityKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl CapabilityDescriptor {
    /// Resources answer to either their name or their URI.
    pub fn answers_to(&self, kind: CapabilityKind, name: &str) -> bool {
        self.kind == kind && (self.name == name || self.uri.as_deref() == Some(name))
    }

    /// Build a descriptor from one entry of a `*/list` response.
    pub(crate) fn from_listing(kind: CapabilityKind, server: &str, entry: &Value) -> Option<Self> {
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        match kind {
            CapabilityKind::Tool => Some(Self {
                kind,
                name: entry.get("name")?.as_str()?.to_string(),
                description,
                input_schema: entry.get("inputSchema").cloned(),
                server: server.to_string(),
                uri: None,
            }),
            CapabilityKind::Prompt => Some(Self {
                kind,
                name: entry.get("name")?.as_str()?.to_string(),
                description,
                input_schema: entry.get("arguments").cloned(),
                server: server.to_string(),
                uri: None,
            }),
            CapabilityKind::Resource => {
                let uri = entry.get("uri")?.as_str()?.to_string();
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| uri.clone());
                Some(Self {
                    kind,
                    name,
                    description,
                    input_schema: None,
                    server: server.to_string(),
                    uri: Some(uri),
                })
            }
        }
    }
}

/// One content block of a capability response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            data: None,
        }
    }

    fn from_value(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_string();
        match value.get("text").and_then(Value::as_str) {
            Some(text) if kind == "text" => Self::text(text),
            _ => Self {
                kind,
                text: None,
                data: Some(value.clone()),
            },
        }
    }

    fn render(&self) -> String {
        match (&self.text, &self.data) {
            (Some(text), _) => text.clone(),
            (None, Some(data)) => data.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Normalized response of a tool call, prompt fetch or resource read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub content: Vec<ContentItem>,
    pub is_error: bool,
}

impl CallResult {
    pub fn from_tool_response(result: &Value) -> Self {
        let mut content: Vec<ContentItem> = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(ContentItem::from_value).collect())
            .unwrap_or_default();
        if content.is_empty() {
            if let Some(structured) = result.get("structuredContent") {
                content.push(ContentItem {
                    kind: "json".to_string(),
                    text: None,
                    data: Some(structured.clone()),
                });
            }
        }
        Self {
            content,
            is_error: result
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    pub fn from_prompt_response(result: &Value) -> Self {
        let content = result
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| message.get("content"))
                    .map(ContentItem::from_value)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            content,
            is_error: false,
        }
    }

    pub fn from_resource_response(result: &Value) -> Self {
        let content = result
            .get("contents")
            .and_then(Value::as_array)
            .map(|contents| {
                contents
                    .iter()
                    .map(|entry| match entry.get("text").and_then(Value::as_str) {
                        Some(text) => ContentItem::text(text),
                        None => ContentItem {
                            kind: "blob".to_string(),
                            text: None,
                            data: Some(entry.clone()),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            content,
            is_error: false,
        }
    }

    /// Text rendering handed back to the model.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(ContentItem::render)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
