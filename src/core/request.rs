/// Free-text request grammar
///
/// ```text
/// message  := command? hint? body
/// command  := "/" word ("@" word)?
/// hint     := language identifier followed by whitespace
/// body     := fenced | inline
/// fenced   := "```" tag? newline code "```"?
/// inline   := rest of the text
/// ```
///
/// A leading hint wins over a fence tag. A fence tag that does not name a
/// known language is ignored and the language is left to detection.
use crate::config::types::Language;
use crate::core::types::ExecutionRequest;

const FENCE: &str = "```";

/// Structured form of a chat-style message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Language named before the code
    pub hint: Option<Language>,
    /// Raw tag after the opening fence, if any
    pub fence_tag: Option<String>,
    pub code: String,
}

impl ParsedMessage {
    /// Effective language: explicit hint, then a recognised fence tag.
    pub fn language(&self) -> Option<Language> {
        self.hint.or_else(|| {
            self.fence_tag
                .as_deref()
                .and_then(|tag| tag.parse::<Language>().ok())
        })
    }

    pub fn into_request(self, caller_id: impl Into<String>) -> ExecutionRequest {
        let language = self.language();
        let request = ExecutionRequest::new(caller_id, self.code);
        match language {
            Some(language) => request.with_language(language.id()),
            None => request,
        }
    }
}

/// Parse a message into hint and code. `None` when there is no code.
pub fn parse_message(text: &str) -> Option<ParsedMessage> {
    let text = strip_command(text.trim());

    let (hint, body) = split_hint(text);
    let (fence_tag, code) = match body.strip_prefix(FENCE) {
        Some(after_fence) => parse_fenced(after_fence),
        None => (None, body.to_string()),
    };

    if code.trim().is_empty() {
        return None;
    }

    Some(ParsedMessage {
        hint,
        fence_tag,
        code,
    })
}

/// Drop a leading `/command` or `/command@bot` token.
fn strip_command(text: &str) -> &str {
    let Some(after_slash) = text.strip_prefix('/') else {
        return text;
    };
    let end = after_slash
        .find(char::is_whitespace)
        .unwrap_or(after_slash.len());
    let token = &after_slash[..end];
    let is_command = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@');
    if is_command {
        after_slash[end..].trim_start()
    } else {
        // `/* comment */` and friends are code.
        text
    }
}

fn split_hint(text: &str) -> (Option<Language>, &str) {
    let Some(end) = text.find(char::is_whitespace) else {
        return (None, text);
    };
    match text[..end].parse::<Language>() {
        Ok(language) => (Some(language), text[end..].trim_start()),
        Err(_) => (None, text),
    }
}

fn parse_fenced(after_fence: &str) -> (Option<String>, String) {
    let first_newline = after_fence.find('\n');

    // Single-line form: ```code```
    if let Some(close) = after_fence.find(FENCE) {
        if first_newline.map_or(true, |nl| close < nl) {
            return (None, after_fence[..close].trim().to_string());
        }
    }

    let (first_line, rest) = match first_newline {
        Some(nl) => (&after_fence[..nl], &after_fence[nl + 1..]),
        None => (after_fence, ""),
    };

    let tag = first_line.trim();
    let (fence_tag, body) = if tag.is_empty() {
        (None, rest.to_string())
    } else if is_fence_tag(tag) {
        (Some(tag.to_string()), rest.to_string())
    } else {
        // No tag: the first line is code.
        (None, format!("{}\n{}", first_line, rest))
    };

    let code = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body.as_str(),
    };
    (fence_tag, code.trim_end().to_string())
}

fn is_fence_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'))
}
