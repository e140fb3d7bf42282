//! Comment line remapping across script edits.
//!
//! ALGORITHM
//! =========
//! 1. Walk the old script's non-blank lines in order. Each one claims the
//!    first not-yet-claimed new line with identical text (trailing
//!    whitespace ignored). This is a greedy first-match, not an LCS: scripts
//!    with many duplicate lines can be misattributed.
//! 2. A comment on a claimed line moves to the claiming line.
//! 3. Otherwise it is placed relative to the nearest claimed lines before and
//!    after it (offset preserved, scaled when the two gaps differ), or
//!    relative to the single anchor that exists, or left alone when nothing
//!    was claimed at all.
//! 4. Results are clamped to the new script's line range.
//!
//! Everything here is pure so it can drive both a live preview and the
//! transform applied on save.

use crate::comments::Comment;

/// Old-line → new-line anchors for one pair of script texts.
#[derive(Clone, Debug)]
pub struct LineMap {
    /// `anchors[old] = Some(new)` for every claimed old line.
    anchors: Vec<Option<usize>>,
    new_line_count: usize,
}

impl LineMap {
    #[must_use]
    pub fn build(old_text: &str, new_text: &str) -> Self {
        let new_lines: Vec<&str> = new_text.lines().map(str::trim_end).collect();
        let mut claimed = vec![false; new_lines.len()];

        let anchors = old_text
            .lines()
            .map(|line| {
                let line = line.trim_end();
                if line.trim_start().is_empty() {
                    return None;
                }
                let found = (0..new_lines.len()).find(|&j| !claimed[j] && new_lines[j] == line)?;
                claimed[found] = true;
                Some(found)
            })
            .collect();

        Self { anchors, new_line_count: new_lines.len() }
    }

    #[must_use]
    pub fn new_line_count(&self) -> usize {
        self.new_line_count
    }

    /// Where old line `line` lands in the new text.
    #[must_use]
    pub fn map_line(&self, line: usize) -> usize {
        if self.new_line_count == 0 {
            return line;
        }
        if let Some(Some(exact)) = self.anchors.get(line) {
            return *exact;
        }

        let before = self.anchors[..line.min(self.anchors.len())]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(old, new)| new.map(|new| (old, new)));
        let after = self
            .anchors
            .iter()
            .enumerate()
            .skip(line.saturating_add(1))
            .find_map(|(old, new)| new.map(|new| (old, new)));

        let line_i = to_i64(line);
        let mapped = match (before, after) {
            (Some((b_old, b_new)), Some((a_old, a_new))) => {
                let (b_old, b_new, a_old, a_new) = (to_i64(b_old), to_i64(b_new), to_i64(a_old), to_i64(a_new));
                let old_gap = a_old - b_old;
                let new_gap = a_new - b_new;
                if old_gap == new_gap {
                    b_new.saturating_add(line_i.saturating_sub(b_old))
                } else {
                    let scaled = line_i.saturating_sub(b_old).saturating_mul(new_gap);
                    b_new.saturating_add(div_round(scaled, old_gap))
                }
            }
            (Some((b_old, b_new)), None) => to_i64(b_new).saturating_add(line_i.saturating_sub(to_i64(b_old))),
            (None, Some((a_old, a_new))) => to_i64(a_new).saturating_sub(to_i64(a_old).saturating_sub(line_i)),
            (None, None) => line_i,
        };

        self.clamp(mapped)
    }

    fn clamp(&self, line: i64) -> usize {
        let max = to_i64(self.new_line_count.saturating_sub(1));
        usize::try_from(line.clamp(0, max)).unwrap_or(0)
    }
}

/// Move every comment to its line in `new_text`.
///
/// Unchanged text and an empty new script return the comments as given.
#[must_use]
pub fn remap(old_text: &str, new_text: &str, comments: &[Comment]) -> Vec<Comment> {
    if old_text == new_text || new_text.trim().is_empty() {
        return comments.to_vec();
    }
    let map = LineMap::build(old_text, new_text);
    comments
        .iter()
        .map(|comment| {
            let mut moved = comment.clone();
            moved.line_number = map.map_line(comment.line_number);
            moved
        })
        .collect()
}

/// Remap bare line numbers (same rules as [`remap`]).
#[must_use]
pub fn remap_lines(old_text: &str, new_text: &str, lines: &[usize]) -> Vec<usize> {
    if old_text == new_text || new_text.trim().is_empty() {
        return lines.to_vec();
    }
    let map = LineMap::build(old_text, new_text);
    lines.iter().map(|line| map.map_line(*line)).collect()
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn div_round(num: i64, den: i64) -> i64 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den.abs() {
        q + if (num < 0) == (den < 0) { 1 } else { -1 }
    } else {
        q
    }
}

#[cfg(test)]
#[path = "remap_test.rs"]
mod tests;
