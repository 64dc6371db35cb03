use std::{path::PathBuf, process::Command};

use anyhow::Context;

use crate::entities::{BBox, TextSpan};

const CONFIDENCE_THRESHOLD: f32 = 0f32;

/// Quadrilateral region of a recognized word, corners in engine order
/// (top-left, top-right, bottom-right, bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub points: [(f32, f32); 4],
}

impl Quad {
    pub fn from_rect(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            points: [
                (left, top),
                (left + width, top),
                (left + width, top + height),
                (left, top + height),
            ],
        }
    }

    /// Axis-aligned hull of the four corners.
    pub fn to_bbox(&self) -> BBox {
        let mut bbox = BBox {
            x0: f32::MAX,
            y0: f32::MAX,
            x1: f32::MIN,
            y1: f32::MIN,
        };
        for (x, y) in self.points {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        bbox
    }
}

#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub region: Quad,
}

/// One detected line, holding the words the engine grouped into it.
#[derive(Debug, Clone, Default)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
}

/// Text-recognition capability: takes a lossless image encoding, returns
/// detected lines in the engine's own reading order.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8]) -> anyhow::Result<Vec<OcrLine>>;
}

/// Flattens the engine's line/word nesting into spans. Engine order is
/// kept as-is; no re-sorting happens on the OCR path.
pub fn flatten_lines(lines: Vec<OcrLine>) -> Vec<TextSpan> {
    lines
        .into_iter()
        .flat_map(|line| line.words)
        .map(|word| TextSpan {
            text: word.text,
            bbox: word.region.to_bbox(),
        })
        .collect()
}

/// OCR backend shelling out to the tesseract binary. `--psm 1` runs full
/// automatic page segmentation with orientation and script detection.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary).arg("--version").output().is_ok()
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, png: &[u8]) -> anyhow::Result<Vec<OcrLine>> {
        let workdir = tempfile::tempdir().context("can't create ocr workdir")?;
        let input_path = workdir.path().join("page.png");
        let output_base = workdir.path().join("page");
        std::fs::write(&input_path, png).context("can't stage ocr input")?;

        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg(&output_base)
            .args(["--psm", "1", "tsv"])
            .output()
            .context("failed to run tesseract")?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let tsv = std::fs::read_to_string(output_base.with_extension("tsv"))
            .context("can't read tesseract output")?;
        Ok(parse_tsv(&tsv))
    }
}

/// Tesseract TSV has one row per detected component; level 5 rows are
/// words. Word rows sharing (block, paragraph, line) ids belong to the
/// same line.
fn parse_tsv(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_line: Option<(u32, u32, u32)> = None;
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<u32>() != Ok(5) {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1f32);
        let text = cols[11].trim();
        if text.is_empty() || conf < CONFIDENCE_THRESHOLD {
            continue;
        }
        let (Ok(block), Ok(par), Ok(line)) = (
            cols[2].parse::<u32>(),
            cols[3].parse::<u32>(),
            cols[4].parse::<u32>(),
        ) else {
            continue;
        };
        let (Ok(left), Ok(top), Ok(width), Ok(height)) = (
            cols[6].parse::<f32>(),
            cols[7].parse::<f32>(),
            cols[8].parse::<f32>(),
            cols[9].parse::<f32>(),
        ) else {
            continue;
        };

        let word = OcrWord {
            text: text.to_owned(),
            region: Quad::from_rect(left, top, width, height),
        };
        let key = (block, par, line);
        if current_line == Some(key) {
            if let Some(last) = lines.last_mut() {
                last.words.push(word);
            }
        } else {
            lines.push(OcrLine { words: vec![word] });
            current_line = Some(key);
        }
    }
    lines
}
