//! Line wrapping for the paint overlay.
//!
//! Re-implements the soft wrapping a `<textarea>` performs so that char ranges
//! can be mapped onto visual lines without reading layout back from the host.

use std::ops::Range;

/// Off-screen text measurement with the surface's font.
pub trait TextMeasurer {
    /// Advance width of `text` in CSS pixels.
    fn measure(&self, text: &str) -> f64;

    fn line_height(&self) -> f64;
}

/// One visual line of wrapped text.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualLine {
    /// Char range of the line within the full text, excluding the newline.
    pub range: Range<usize>,
    pub text: String,
    pub width: f64,
}

struct LineBuilder<'m, M: TextMeasurer> {
    measurer: &'m M,
    max_width: f64,
    lines: Vec<VisualLine>,
    start: usize,
    text: String,
    width: f64,
}

impl<'m, M: TextMeasurer> LineBuilder<'m, M> {
    fn push(&mut self, piece: &str, width: f64) {
        self.text.push_str(piece);
        self.width += width;
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn fits(&self, width: f64) -> bool {
        self.width + width <= self.max_width
    }

    fn end(&self) -> usize {
        self.start + self.text.chars().count()
    }

    fn break_line(&mut self) {
        let end = self.end();
        self.lines.push(VisualLine {
            range: self.start..end,
            text: std::mem::take(&mut self.text),
            width: self.width,
        });
        self.start = end;
        self.width = 0.0;
    }

    /// Place a word wider than a whole line, one char at a time.
    fn push_broken(&mut self, word: &str) {
        let mut buf = [0u8; 4];
        for c in word.chars() {
            let piece = c.encode_utf8(&mut buf);
            let w = self.measurer.measure(piece);
            if !self.is_empty() && !self.fits(w) {
                self.break_line();
            }
            self.push(piece, w);
        }
    }
}

/// Greedy word wrap of `text` into lines no wider than `max_width`.
///
/// Whitespace hangs at the end of the line it follows, hard newlines always
/// break, and words longer than a line are broken between chars. Pass
/// `f64::INFINITY` for single-line surfaces.
pub fn wrap_lines<M: TextMeasurer>(text: &str, max_width: f64, measurer: &M) -> Vec<VisualLine> {
    let mut builder = LineBuilder {
        measurer,
        max_width,
        lines: Vec::new(),
        start: 0,
        text: String::new(),
        width: 0.0,
    };

    let mut paragraphs = text.split('\n').peekable();
    while let Some(paragraph) = paragraphs.next() {
        for token in tokens(paragraph) {
            let w = measurer.measure(token);
            let is_space = token.starts_with(char::is_whitespace);
            if is_space || builder.fits(w) {
                builder.push(token, w);
            } else if builder.is_empty() {
                builder.push_broken(token);
            } else {
                builder.break_line();
                if builder.fits(w) {
                    builder.push(token, w);
                } else {
                    builder.push_broken(token);
                }
            }
        }
        builder.break_line();
        if paragraphs.peek().is_some() {
            // Skip the newline itself.
            builder.start += 1;
        }
    }
    builder.lines
}

/// Split into alternating runs of whitespace and non-whitespace.
fn tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != space)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        rest = tail;
        Some(token)
    })
}
