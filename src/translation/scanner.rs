/// Lexical context of the byte under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Byte-level lookahead helpers over one SQL string.
pub(super) struct Scanner<'a> {
    bytes: &'a [u8],
}

impl<'a> Scanner<'a> {
    pub(super) fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(super) fn at(&self, idx: usize) -> Option<u8> {
        self.bytes.get(idx).copied()
    }

    fn pair(&self, idx: usize, first: u8, second: u8) -> bool {
        self.at(idx) == Some(first) && self.at(idx + 1) == Some(second)
    }

    pub(super) fn line_comment_starts(&self, idx: usize) -> bool {
        self.pair(idx, b'-', b'-')
    }

    pub(super) fn block_comment_starts(&self, idx: usize) -> bool {
        self.pair(idx, b'/', b'*')
    }

    pub(super) fn block_comment_ends(&self, idx: usize) -> bool {
        self.pair(idx, b'*', b'/')
    }

    /// `$tag$` opening at `start`: the tag and the index of its closing `$`.
    pub(super) fn dollar_tag(&self, start: usize) -> Option<(String, usize)> {
        let rest = self.bytes.get(start + 1..)?;
        let close = rest.iter().position(|b| *b == b'$')?;
        let tag = &rest[..close];
        if !tag.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            return None;
        }
        // `$1` is a placeholder, not a tag
        if tag.first().is_some_and(u8::is_ascii_digit) {
            return None;
        }
        let tag = std::str::from_utf8(tag).ok()?.to_string();
        Some((tag, start + 1 + close))
    }

    /// Whether `$tag$` closes at `idx`.
    pub(super) fn closes_tag(&self, idx: usize, tag: &str) -> bool {
        let end = idx + 1 + tag.len();
        self.at(idx) == Some(b'$')
            && self.bytes.get(idx + 1..end) == Some(tag.as_bytes())
            && self.at(end) == Some(b'$')
    }

    /// Digits starting at `start` and the index just past them.
    pub(super) fn digits(&self, start: usize) -> Option<(usize, &'a str)> {
        let bytes: &'a [u8] = self.bytes;
        let run = bytes
            .get(start..)?
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if run == 0 {
            return None;
        }
        let end = start + run;
        std::str::from_utf8(&bytes[start..end])
            .ok()
            .map(|d| (end, d))
    }
}
