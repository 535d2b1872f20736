use std::ops::Range;

use bevy_log::warn;

use crate::glyph::GlyphKey;

pub const MODIFIER: char = '$';
pub const START_MODIFIED: char = '[';
pub const END_MODIFIED: char = ']';

/// A resolved unit of one line. Spans are `char` offsets into the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Glyph { key: GlyphKey, span: Range<usize> },
    Whitespace { span: Range<usize> },
}

impl Token {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Token::Glyph { span, .. } | Token::Whitespace { span } => span,
        }
    }

    /// Offset of the first character covered by this token.
    pub fn start(&self) -> usize {
        self.span().start
    }

    pub fn key(&self) -> Option<&GlyphKey> {
        match self {
            Token::Glyph { key, .. } => Some(key),
            Token::Whitespace { .. } => None,
        }
    }
}

/// Tokens of one line plus where the line starts in the whole text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenizedLine {
    /// `char` offset of the line's first character in the full text.
    pub start: usize,
    /// Number of `char`s in the line, excluding the newline.
    pub len: usize,
    pub tokens: Vec<Token>,
}

/// A full text buffer split on `\n` and tokenized line by line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenizedText {
    pub lines: Vec<TokenizedLine>,
    /// Number of `char`s in the full text, newlines included.
    pub char_count: usize,
}

impl TokenizedText {
    pub fn new(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for line in text.split('\n') {
            let len = line.chars().count();
            lines.push(TokenizedLine {
                start,
                len,
                tokens: tokenize(line),
            });
            // skip the newline separator
            start += len + 1;
        }
        Self {
            lines,
            char_count: text.chars().count(),
        }
    }

    /// Glyph tokens of every line, with their slot in the full text.
    pub fn glyph_slots(&self) -> impl Iterator<Item = (usize, &GlyphKey)> {
        self.lines.iter().flat_map(|line| {
            line.tokens
                .iter()
                .filter_map(move |token| token.key().map(|key| (line.start + token.start(), key)))
        })
    }

    /// True when the text holds no glyph tokens at all.
    pub fn is_blank(&self) -> bool {
        self.glyph_slots().next().is_none()
    }
}

/// Split one line into glyph and whitespace tokens.
///
/// `$[KEY]` resolves to the single glyph key `[KEY]`. An unterminated or
/// empty escape is logged and its `$` is treated as a literal character.
pub fn tokenize(line: &str) -> Vec<Token> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            tokens.push(Token::Whitespace { span: i..i + 1 });
            i += 1;
            continue;
        }

        if let Some(end) = escape_end(&chars, i) {
            let key: String = chars[i + 1..=end].iter().collect();
            tokens.push(Token::Glyph {
                key: GlyphKey::new(key),
                span: i..end + 1,
            });
            i = end + 1;
            continue;
        }

        tokens.push(Token::Glyph {
            key: GlyphKey::from(c),
            span: i..i + 1,
        });
        i += 1;
    }
    tokens
}

/// Index of the closing bracket of a well-formed escape starting at `start`.
fn escape_end(chars: &[char], start: usize) -> Option<usize> {
    if chars.get(start) != Some(&MODIFIER) || chars.get(start + 1) != Some(&START_MODIFIED) {
        return None;
    }
    let close = chars[start + 2..]
        .iter()
        .position(|c| *c == END_MODIFIED)
        .map(|offset| start + 2 + offset);
    match close {
        // `$[` + at least one key char + `]`
        Some(end) if end - start + 1 > 3 => Some(end),
        _ => {
            let rest: String = chars[start..].iter().collect();
            warn!(
                "Malformed glyph escape in \"{rest}\"; treating '{MODIFIER}' as a literal character"
            );
            None
        }
    }
}
