use std::process::Command;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Extracted text plus the mean word-level confidence (0-100).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub avg_confidence: f64,
}

/// Text recognition over a captured region buffer. `None` signals a
/// transient analysis failure; dependent conditions fail closed.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Option<OcrResult>;
}

/// OCR via the `tesseract` binary in TSV output mode. Word-level rows carry
/// a confidence column; rows with negative confidence are layout artifacts
/// and are excluded from both the text and the average.
pub struct TesseractOcr {
    cmd: String,
}

impl TesseractOcr {
    pub fn new(cmd: Option<String>) -> Self {
        let cmd = cmd.unwrap_or_else(|| "tesseract".to_string());
        tracing::info!(cmd = %cmd, "tesseract OCR engine configured");
        Self { cmd }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &RgbaImage) -> Option<OcrResult> {
        let tmp = std::env::temp_dir().join(format!("vigil-ocr-{}.png", uuid::Uuid::new_v4()));
        if let Err(e) = image.save(&tmp) {
            tracing::error!(error = %e, "failed to write OCR scratch image");
            return None;
        }

        let output = Command::new(&self.cmd)
            .arg(&tmp)
            .arg("stdout")
            .arg("tsv")
            .output();
        let _ = std::fs::remove_file(&tmp);

        match output {
            Ok(out) if out.status.success() => {
                let tsv = String::from_utf8_lossy(&out.stdout);
                Some(parse_tsv(&tsv))
            }
            Ok(out) => {
                tracing::error!(
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr),
                    "tesseract exited with failure"
                );
                None
            }
            Err(e) => {
                tracing::error!(cmd = %self.cmd, error = %e, "tesseract not runnable");
                None
            }
        }
    }
}

/// Tesseract TSV layout: level, page, block, par, line, word, left, top,
/// width, height, conf, text. Level 5 rows are words.
fn parse_tsv(tsv: &str) -> OcrResult {
    let mut words: Vec<String> = Vec::new();
    let mut confidences: Vec<f64> = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf: f64 = match cols[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        words.push(text.to_string());
        confidences.push(conf);
    }

    let avg_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    OcrResult {
        text: words.join(" "),
        avg_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn parses_word_rows_and_averages_confidence() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t100\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t2\t2\t40\t12\t90\tLogin\n\
             5\t1\t1\t1\t1\t2\t44\t2\t40\t12\t70\tFailed\n"
        );
        let result = parse_tsv(&tsv);
        assert_eq!(result.text, "Login Failed");
        assert!((result.avg_confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn negative_confidence_rows_are_ignored() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t2\t2\t40\t12\t-1\tghost\n\
             5\t1\t1\t1\t1\t2\t44\t2\t40\t12\t55\treal\n"
        );
        let result = parse_tsv(&tsv);
        assert_eq!(result.text, "real");
        assert!((result.avg_confidence - 55.0).abs() < 1e-9);
    }

    #[test]
    fn empty_output_gives_empty_text_zero_confidence() {
        let result = parse_tsv(HEADER);
        assert_eq!(result.text, "");
        assert_eq!(result.avg_confidence, 0.0);
    }
}
