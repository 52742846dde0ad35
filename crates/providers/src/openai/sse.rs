use chatstream_core::chat::{ChatError, Message, Role};
use serde::Deserialize;

/// One upstream streaming chunk: zero-or-one choices carrying a role/content
/// delta.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    /// Framing or heartbeat line, not content.
    Skip,
    /// Literal `[DONE]` terminator: clean completion.
    Done,
    /// One delta fragment.
    Delta(Message),
}

pub(crate) fn parse_line(line: &str) -> Result<SseLine, ChatError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if !line.starts_with("data") {
        return Ok(SseLine::Skip);
    }
    // A line carrying the marker without the full `data: ` prefix falls
    // through unchanged and fails the JSON parse below.
    let body = line.strip_prefix("data: ").unwrap_or(line);
    if body == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: StreamChunk =
        serde_json::from_str(body).map_err(|e| ChatError::Decode(e.to_string()))?;
    message_from_chunk(chunk)
        .map(SseLine::Delta)
        .ok_or(ChatError::EmptyResponse)
}

fn message_from_chunk(chunk: StreamChunk) -> Option<Message> {
    let first = chunk.choices.into_iter().next()?;
    Some(Message {
        role: role_from_wire(first.delta.role.as_deref()),
        content: first.delta.content.unwrap_or_default(),
    })
}

fn role_from_wire(role: Option<&str>) -> Role {
    match role {
        Some("user") => Role::User,
        Some("system") => Role::System,
        _ => Role::Assistant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_data_lines_are_skipped() {
        assert_eq!(parse_line("\n").unwrap(), SseLine::Skip);
        assert_eq!(parse_line(": keep-alive\n").unwrap(), SseLine::Skip);
        assert_eq!(parse_line("event: message\n").unwrap(), SseLine::Skip);
    }

    #[test]
    fn done_terminator_signals_clean_completion() {
        assert_eq!(parse_line("data: [DONE]\n").unwrap(), SseLine::Done);
        assert_eq!(parse_line("data: [DONE]\r\n").unwrap(), SseLine::Done);
    }

    #[test]
    fn delta_line_yields_role_and_content() {
        let line = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"}}]}\n";
        assert_eq!(
            parse_line(line).unwrap(),
            SseLine::Delta(Message::assistant("Hi"))
        );
    }

    #[test]
    fn missing_role_falls_back_to_assistant() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n";
        assert_eq!(
            parse_line(line).unwrap(),
            SseLine::Delta(Message::assistant(" there"))
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = parse_line("data: {not json\n").unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
    }

    #[test]
    fn marker_without_prefix_is_a_decode_error() {
        let err = parse_line("data:{\"choices\":[]}\n").unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
    }

    #[test]
    fn empty_choices_is_an_empty_response_error() {
        let err = parse_line("data: {\"choices\":[]}\n").unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
    }
}
