//! Per-page assembly of text-layer output.

use crate::entities::{TextSpan, Word};

/// Orders words top-to-bottom then left-to-right and appends one trailing
/// space to each, so downstream consumers can concatenate spans directly.
pub(crate) fn text_layer_spans(mut words: Vec<Word>) -> Vec<TextSpan> {
    words.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    words
        .into_iter()
        .map(|word| TextSpan {
            text: word.text + " ",
            bbox: word.bbox,
        })
        .collect()
}
