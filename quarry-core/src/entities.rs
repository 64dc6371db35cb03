use serde::{Deserialize, Serialize};
use std::time::Duration;

use pdfium_render::prelude::PdfRect;

const QUARRY_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Pdfium rects are bottom-left origin; page output is top-left origin.
    pub(crate) fn from_pdfrect(
        PdfRect {
            bottom,
            left,
            top,
            right,
        }: PdfRect,
        page_height: f32,
    ) -> Self {
        Self {
            x0: left.value,
            y0: page_height - top.value,
            x1: right.value,
            y1: page_height - bottom.value,
        }
    }

    #[inline(always)]
    pub(crate) fn merge(&mut self, other: &Self) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }
}

/// A positioned text unit of a page, either read from the text layer or
/// recognized by OCR.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BBox,
}

/// A word assembled from the pdfium character stream. Internal to the
/// text-layer path; serialized output goes through [`TextSpan`].
#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
    pub bbox: BBox,
}

/// Per-page extraction result. The discriminant records which path produced
/// the spans; both variants carry the same span shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageText {
    TextLayer { page: usize, spans: Vec<TextSpan> },
    Ocr { page: usize, spans: Vec<TextSpan> },
}

impl PageText {
    /// 1-indexed page number in source order.
    pub fn page(&self) -> usize {
        match self {
            PageText::TextLayer { page, .. } | PageText::Ocr { page, .. } => *page,
        }
    }

    pub fn spans(&self) -> &[TextSpan] {
        match self {
            PageText::TextLayer { spans, .. } | PageText::Ocr { spans, .. } => spans,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DocumentMetadata {
    #[serde(with = "serde_millis")]
    pub extraction_duration: Duration,
    pub quarry_version: String,
}

impl DocumentMetadata {
    pub fn new(extraction_duration: Duration) -> Self {
        Self {
            extraction_duration,
            quarry_version: QUARRY_VERSION.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExtractedDocument {
    pub source: String,
    pub pages: Vec<PageText>,
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut bbox = BBox {
            x0: 1.0,
            y0: 1.0,
            x1: 3.0,
            y1: 2.0,
        };
        bbox.merge(&BBox {
            x0: 0.5,
            y0: 1.5,
            x1: 2.0,
            y1: 4.0,
        });
        assert_eq!(
            bbox,
            BBox {
                x0: 0.5,
                y0: 1.0,
                x1: 3.0,
                y1: 4.0,
            }
        );

        // Merging a contained box changes nothing.
        let mut outer = BBox {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
        };
        let before = outer.clone();
        outer.merge(&BBox {
            x0: 2.0,
            y0: 2.0,
            x1: 3.0,
            y1: 3.0,
        });
        assert_eq!(outer, before);
    }

    #[test]
    fn page_text_serializes_with_kind_tag() {
        let page = PageText::TextLayer {
            page: 1,
            spans: vec![TextSpan {
                text: "word ".into(),
                bbox: BBox {
                    x0: 1.0,
                    y0: 2.0,
                    x1: 3.0,
                    y1: 4.0,
                },
            }],
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({
                "kind": "text_layer",
                "page": 1,
                "spans": [
                    {"text": "word ", "bbox": {"x0": 1.0, "y0": 2.0, "x1": 3.0, "y1": 4.0}}
                ]
            })
        );

        let page = PageText::Ocr {
            page: 2,
            spans: vec![],
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({"kind": "ocr", "page": 2, "spans": []})
        );
    }
}
