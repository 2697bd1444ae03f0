//! Argument tokenizer: splits command argument text into tokens.
//!
//! Tokens are separated by the base separator. A registered start marker opens
//! a block that runs verbatim to its end marker (or end of input) and becomes a
//! single token. Blocks do not nest.

use std::collections::HashMap;

use parlor_config::TokenizerOptions;

#[derive(Debug, Clone)]
pub struct ArgumentTokenizer {
    base: char,
    blocks: HashMap<char, char>,
}

impl ArgumentTokenizer {
    pub fn new(options: &TokenizerOptions) -> Self {
        let mut blocks: HashMap<char, char> =
            options.blocks.iter().map(|(start, end)| (*start, *end)).collect();
        blocks.insert(options.base_separator, options.base_separator);
        Self {
            base: options.base_separator,
            blocks,
        }
    }

    /// Split `text` starting at byte offset `start`.
    ///
    /// Empty and whitespace-only tokens are dropped, including those produced
    /// by empty blocks such as `""`.
    pub fn tokenize(&self, text: &str, start: usize) -> Vec<String> {
        let input = text.get(start..).unwrap_or_default();
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut block_end: Option<char> = None;

        for c in input.chars() {
            match block_end {
                Some(end) => {
                    if c == end {
                        tokens.push(std::mem::take(&mut current));
                        block_end = None;
                    } else {
                        current.push(c);
                    }
                }
                None if c == self.base => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                None => match self.blocks.get(&c) {
                    Some(end) => {
                        tokens.push(std::mem::take(&mut current));
                        block_end = Some(*end);
                    }
                    None => current.push(c),
                },
            }
        }
        // Unterminated blocks run to the end of input.
        tokens.push(current);

        tokens.retain(|t| !t.trim().is_empty());
        tokens
    }
}

impl Default for ArgumentTokenizer {
    fn default() -> Self {
        Self::new(&TokenizerOptions::default())
    }
}
