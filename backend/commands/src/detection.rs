/// Prefix and command-word detection at the start of a message.
use parlor_core::ChatMessage;

use crate::context::CommandContextOptions;

/// Strip `prefix` from the start of `text`.
///
/// Case-insensitive comparison folds each character to lowercase.
pub fn strip_prefix<'a>(text: &'a str, prefix: &str, case_sensitive: bool) -> Option<&'a str> {
    if case_sensitive {
        return text.strip_prefix(prefix);
    }
    let mut rest = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let consumed = rest.next().map(|(i, _)| i).unwrap_or(text.len());
    Some(&text[consumed..])
}

/// Text left for the trigger once the prefix has been handled.
///
/// Returns `None` when the message lacks the prefix and the prefix is
/// required for its chat kind.
pub fn resolve_prefix<'a>(message: &'a ChatMessage, options: &CommandContextOptions) -> Option<&'a str> {
    let text = message.text.trim_start();
    match strip_prefix(text, &options.prefix, options.case_sensitive) {
        Some(rest) => Some(rest),
        None if options.require_prefix.required_for(message.kind) => None,
        None => Some(text),
    }
}

/// Strip the command word `name`; it must be followed by whitespace or the
/// end of the text. Returns the argument text.
pub fn strip_command_word<'a>(text: &'a str, name: &str, case_sensitive: bool) -> Option<&'a str> {
    let rest = strip_prefix(text, name, case_sensitive)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim_start()),
        Some(_) => None,
    }
}
