use serde::{Deserialize, Serialize};

/// One block of tool output. Report tools emit `Text`; `Data` carries
/// base64 payloads with a media type, `Resource` points at an external
/// locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Data {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// The payload a successful `tools/call` wraps into its `result`.
/// A non-empty `content` list is a tool-author convention, not enforced
/// by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Observed convention: report tools prefer returning a readable
    /// `Error: ...` block over failing the protocol exchange.
    pub fn error_text(message: impl std::fmt::Display) -> Self {
        Self::text(format!("Error: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_block_serializes_with_type_tag() {
        let block = ContentBlock::text("hi");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({ "type": "text", "text": "hi" })
        );
    }

    #[test]
    fn data_block_uses_camel_case_mime_type() {
        let block = ContentBlock::Data {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["mimeType"], json!("image/png"));
    }

    #[test]
    fn error_text_prefixes_message() {
        let result = ToolResult::error_text("quota exceeded");
        assert_eq!(
            result.content[0].as_text(),
            Some("Error: quota exceeded")
        );
    }
}
