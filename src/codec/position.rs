use crate::properties::Position;

/// Maps byte offsets of one text onto zero-based (line, column) positions.
///
/// `\n`, `\r\n` and a lone `\r` all end a line. Columns count chars, so a position stays
/// meaningful for editors that index by character rather than by byte.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> LineIndex<'a> {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        let mut idx = 0;
        while idx < bytes.len() {
            match bytes[idx] {
                b'\n' => line_starts.push(idx + 1),
                b'\r' => {
                    if bytes.get(idx + 1) == Some(&b'\n') {
                        idx += 1;
                    }
                    line_starts.push(idx + 1);
                }
                _ => {}
            }
            idx += 1;
        }
        LineIndex { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of byte `offset`. Offsets past the end clamp to the end of the text; offsets inside
    /// a multi-byte char or a `\r\n` pair map to the preceding boundary.
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let line_start = self.line_starts[line];
        Position {
            line,
            column: self.text[line_start..offset].chars().count(),
        }
    }

    /// Byte offset of `position`, or `None` when the position is outside the text.
    pub fn offset(&self, position: Position) -> Option<usize> {
        let line_start = *self.line_starts.get(position.line)?;
        let line_end = self
            .line_starts
            .get(position.line + 1)
            .copied()
            .unwrap_or(self.text.len());
        let line_text = &self.text[line_start..line_end];
        if position.column == 0 {
            return Some(line_start);
        }
        line_text
            .char_indices()
            .nth(position.column)
            .map(|(idx, _)| line_start + idx)
            .or_else(|| {
                (line_text.chars().count() == position.column).then_some(line_end)
            })
    }
}
