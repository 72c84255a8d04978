//! Offset-stable source replacements.
//!
//! Replacements address the original source text by byte offset and are only
//! materialized by [`ReplacementList::apply`], so queuing or extending one never
//! shifts the offsets of another.

use log::{trace, warn};
use oxc_span::Span;

use crate::error::MergeError;

/// A queued, not yet materialized substitution.
///
/// `end` is inclusive: the replacement covers `start..=end` of the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReplacement {
    pub start: u32,
    pub end: u32,
    pub content: String,
}

impl PendingReplacement {
    /// Builds a replacement covering the half-open `span`, which must be non-empty.
    pub fn covering(span: Span, content: impl Into<String>) -> Self {
        Self { start: span.start, end: span.end.saturating_sub(1).max(span.start), content: content.into() }
    }

    /// The covered range as a half-open span
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end + 1)
    }

    fn overlaps(&self, span: Span) -> bool {
        self.start < span.end && span.start <= self.end
    }
}

/// Replacements queued for one module's output, ordered by start offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementList {
    items: Vec<PendingReplacement>,
}

impl ReplacementList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a replacement for `span`. Entries stay sorted by start offset,
    /// entries with equal starts keep their queue order.
    pub fn queue(&mut self, span: Span, content: impl Into<String>) {
        let item = PendingReplacement::covering(span, content);
        let at = self.items.partition_point(|r| r.start <= item.start);
        trace!("Queued replacement {}..={} at index {}", item.start, item.end, at);
        self.items.insert(at, item);
    }

    /// Index of the replacement covering exactly `span`.
    pub fn find(&self, span: Span) -> Option<usize> {
        if span.end <= span.start {
            return None;
        }
        self.items.iter().position(|r| r.start == span.start && r.end == span.end - 1)
    }

    /// Fuses the replacement queued for `target` with the text that follows it,
    /// so that it covers `extended` and emits `content`.
    ///
    /// `extended` must start where `target` starts and end at or after it. The
    /// merge is refused when the grown range would swallow part of another
    /// queued replacement; ranges that merely touch are fine.
    pub fn merge(
        &mut self,
        target: Span,
        extended: Span,
        content: impl Into<String>,
    ) -> Result<(), MergeError> {
        if extended.start != target.start || extended.end < target.end {
            return Err(MergeError::InvalidExtension { target, extended });
        }
        let idx = self.find(target).ok_or(MergeError::MissingPlaceholder { span: target })?;

        if let Some(other) = self
            .items
            .iter()
            .enumerate()
            .find(|(i, r)| *i != idx && r.overlaps(extended))
            .map(|(_, r)| r.span())
        {
            return Err(MergeError::Overlap { extended, other });
        }

        let item = &mut self.items[idx];
        item.end = extended.end - 1;
        item.content = content.into();
        trace!("Merged replacement {}..={}", item.start, item.end);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingReplacement> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Materializes the replacements over `source`.
    ///
    /// A replacement that overlaps an earlier one, or does not fall on char
    /// boundaries of `source`, is skipped with a warning.
    pub fn apply(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0usize;

        for r in &self.items {
            let start = r.start as usize;
            let end = r.end as usize + 1;
            if start < cursor {
                warn!("Skipping replacement {}..={} overlapping previous output", r.start, r.end);
                continue;
            }
            if end > source.len() || !source.is_char_boundary(end) {
                warn!("Skipping replacement {}..={} outside source bounds", r.start, r.end);
                continue;
            }
            let Some(gap) = source.get(cursor..start) else {
                warn!("Skipping replacement {}..={} outside source bounds", r.start, r.end);
                continue;
            };
            out.push_str(gap);
            out.push_str(&r.content);
            cursor = end;
        }

        out.push_str(&source[cursor..]);
        out
    }
}
