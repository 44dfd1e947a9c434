//! Text storage and offset helpers.
//!
//! All offsets in the core are in Unicode scalar values (chars), not bytes or
//! UTF-16 code units. Hosts that speak UTF-16 (the DOM) convert at the edge with
//! [`utf16_to_char`] / [`char_to_utf16`].

use std::ops::Range;

use smol_str::{SmolStr, ToSmolStr};

/// A text buffer that supports editing by char offsets.
pub trait TextBuffer {
    /// Total length in chars.
    fn len_chars(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Insert text at char offset.
    fn insert(&mut self, char_offset: usize, text: &str);

    /// Delete char range.
    fn delete(&mut self, char_range: Range<usize>);

    /// Replace char range with text.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.delete(char_range.clone());
        self.insert(char_range.start, text);
    }

    /// Get a slice. Returns None if the range is out of bounds or reversed.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;
}

/// Ropey-backed text buffer used for in-memory surfaces.
#[derive(Clone, Debug, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }

    /// Replace the whole contents.
    pub fn set(&mut self, s: &str) {
        self.rope = ropey::Rope::from_str(s);
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

/// Number of chars in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of a char offset, or None past the end.
fn byte_index(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    let mut seen = 0;
    for (byte, _) in text.char_indices() {
        if seen == char_offset {
            return Some(byte);
        }
        seen += 1;
    }
    (seen == char_offset).then_some(text.len())
}

/// Slice `text` by char range. None if out of bounds or reversed.
pub fn char_slice(text: &str, range: Range<usize>) -> Option<&str> {
    if range.start > range.end {
        return None;
    }
    let start = byte_index(text, range.start)?;
    let end = byte_index(text, range.end)?;
    Some(&text[start..end])
}

/// Return `text` with the char range replaced. None if the range is invalid.
pub fn splice_chars(text: &str, range: Range<usize>, replacement: &str) -> Option<String> {
    if range.start > range.end {
        return None;
    }
    let start = byte_index(text, range.start)?;
    let end = byte_index(text, range.end)?;
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..start]);
    out.push_str(replacement);
    out.push_str(&text[end..]);
    Some(out)
}

/// Convert a UTF-16 offset into a char offset, clamping to the end.
pub fn utf16_to_char(text: &str, utf16_offset: usize) -> usize {
    let mut units = 0;
    for (chars, c) in text.chars().enumerate() {
        if units >= utf16_offset {
            return chars;
        }
        units += c.len_utf16();
    }
    char_len(text)
}

/// Convert a char offset into a UTF-16 offset, clamping to the end.
pub fn char_to_utf16(text: &str, char_offset: usize) -> usize {
    text.chars().take(char_offset).map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rope_replace() {
        let mut rope = EditorRope::from_str("hello world");
        rope.replace(6..11, "rust");
        assert_eq!(rope.to_string(), "hello rust");
        assert_eq!(rope.slice(0..5).as_deref(), Some("hello"));
        assert_eq!(rope.slice(0..100), None);
    }

    #[test]
    fn test_char_slice_multibyte() {
        let text = "héllo wörld";
        assert_eq!(char_slice(text, 0..5), Some("héllo"));
        assert_eq!(char_slice(text, 6..11), Some("wörld"));
        assert_eq!(char_slice(text, 11..11), Some(""));
        assert_eq!(char_slice(text, 6..12), None);
        assert_eq!(char_slice(text, 5..4), None);
    }

    #[test]
    fn test_splice_chars() {
        assert_eq!(
            splice_chars("I has a radnom typo.", 2..5, "have").as_deref(),
            Some("I have a radnom typo.")
        );
        assert_eq!(splice_chars("abc", 1..9, "x"), None);
    }

    #[test]
    fn test_utf16_conversion() {
        // "a😀b": the emoji is 1 char but 2 UTF-16 units.
        let text = "a😀b";
        assert_eq!(char_to_utf16(text, 0), 0);
        assert_eq!(char_to_utf16(text, 2), 3);
        assert_eq!(char_to_utf16(text, 3), 4);
        assert_eq!(utf16_to_char(text, 3), 2);
        assert_eq!(utf16_to_char(text, 4), 3);
        assert_eq!(utf16_to_char(text, 99), 3);
    }
}
