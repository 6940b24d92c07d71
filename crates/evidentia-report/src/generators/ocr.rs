//! Image OCR report.

use crate::helpers::{header, short_sha};
use crate::{ReportGenerator, ReportResult};
use evidentia_core::CaseSummary;

pub struct ImageOcrReport;

impl ReportGenerator for ImageOcrReport {
    fn filename(&self) -> &'static str {
        "image_ocr.md"
    }

    fn has_data(&self, summary: &CaseSummary) -> bool {
        summary
            .overall_assessment
            .image_ocr
            .as_ref()
            .is_some_and(|ocr| ocr.images_with_text >= 1)
    }

    fn render(&self, summary: &CaseSummary) -> ReportResult<String> {
        let ocr = summary
            .overall_assessment
            .image_ocr
            .as_ref()
            .expect("has_data checked");

        let mut out = header("Image Text Extraction", summary);
        out.push_str(&format!(
            "\n{} of {} images carry legible text; {} show visible timestamps \
             and {} show people.\n",
            ocr.images_with_text, ocr.images_total, ocr.images_with_timestamps,
            ocr.images_with_people
        ));

        // High value band first.
        for band in ["high", "medium", "low"] {
            let Some(samples) = ocr.samples_by_value.get(band) else {
                continue;
            };
            out.push_str(&format!("\n## {band} evidence value\n\n"));
            for sample in samples {
                out.push_str(&format!(
                    "- `{}`: {}\n",
                    short_sha(&sample.evidence_sha256),
                    sample.excerpt
                ));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::minimal_summary;
    use evidentia_core::summary::{ImageOcrAggregate, OcrSample};
    use std::collections::BTreeMap;

    #[test]
    fn test_requires_at_least_one_image_with_text() {
        let mut summary = minimal_summary();
        summary.overall_assessment.image_ocr = Some(ImageOcrAggregate {
            images_total: 3,
            images_with_text: 0,
            images_with_timestamps: 0,
            images_with_people: 1,
            samples_by_value: BTreeMap::new(),
        });
        assert!(!ImageOcrReport.has_data(&summary));
    }

    #[test]
    fn test_bands_render_high_first() {
        let mut samples_by_value = BTreeMap::new();
        samples_by_value.insert(
            "low".to_string(),
            vec![OcrSample {
                evidence_sha256: "1".repeat(64),
                excerpt: "blurry receipt".to_string(),
            }],
        );
        samples_by_value.insert(
            "high".to_string(),
            vec![OcrSample {
                evidence_sha256: "2".repeat(64),
                excerpt: "NOTICE OF TERMINATION".to_string(),
            }],
        );

        let mut summary = minimal_summary();
        summary.overall_assessment.image_ocr = Some(ImageOcrAggregate {
            images_total: 2,
            images_with_text: 2,
            images_with_timestamps: 1,
            images_with_people: 0,
            samples_by_value,
        });

        let body = ImageOcrReport.render(&summary).unwrap();
        let high = body.find("NOTICE OF TERMINATION").unwrap();
        let low = body.find("blurry receipt").unwrap();
        assert!(high < low);
        assert!(body.contains("2 of 2 images"));
    }
}
