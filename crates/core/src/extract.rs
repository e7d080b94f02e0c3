use crate::error::LoadError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document as PdfDocument;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// High-fidelity extraction service, when one is configured. Handles both
/// PDFs and slide decks and accepts a language hint for OCR-heavy content.
#[derive(Debug, Clone)]
pub struct ExtractionServiceConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

pub fn extraction_service_from_env() -> Option<ExtractionServiceConfig> {
    let endpoint = std::env::var("EXTRACTION_ENDPOINT").ok()?;
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return None;
    }

    let api_key = std::env::var("EXTRACTION_API_KEY").ok().and_then(|value| {
        let key = value.trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    });

    Some(ExtractionServiceConfig { endpoint, api_key })
}

#[derive(Debug, Serialize)]
struct ExtractionRequest {
    file_base64: String,
    file_name: String,
    strategy: String,
    languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    elements: Option<Vec<ExtractionElement>>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionElement {
    #[serde(default)]
    text: Option<String>,
}

/// Extracts text from a PDF: high-fidelity service first (Japanese language
/// hint), native extraction when no service is configured.
pub fn extract_pdf_text(path: &Path) -> Result<String, LoadError> {
    match extraction_service_from_env() {
        Some(config) => extract_via_service(&config, path),
        None => {
            debug!(path = %path.display(), "no extraction service configured, using native pdf extraction");
            extract_pdf_native(path)
        }
    }
}

/// Same high-fidelity-then-fallback pattern for slide decks; the native
/// fallback reads text runs out of the slide XML.
pub fn extract_slides_text(path: &Path) -> Result<String, LoadError> {
    match extraction_service_from_env() {
        Some(config) => extract_via_service(&config, path),
        None => {
            debug!(path = %path.display(), "no extraction service configured, using native slide extraction");
            extract_slides_native(path)
        }
    }
}

fn extract_via_service(config: &ExtractionServiceConfig, path: &Path) -> Result<String, LoadError> {
    tokio::task::block_in_place(|| extract_via_service_blocking(config, path))
}

fn extract_via_service_blocking(
    config: &ExtractionServiceConfig,
    path: &Path,
) -> Result<String, LoadError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LoadError::MissingFileName(path.display().to_string()))?;

    let payload = ExtractionRequest {
        file_base64: STANDARD.encode(bytes),
        file_name: file_name.to_string(),
        strategy: "hi_res".to_string(),
        languages: vec!["jpn".to_string()],
    };

    let mut request = Client::new()
        .post(&config.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;

    if !response.status().is_success() {
        return Err(LoadError::ExtractionService(format!(
            "extraction request to {} returned {}",
            config.endpoint,
            response.status()
        )));
    }

    let payload: ExtractionResponse = response.json()?;
    let text = response_to_text(&payload);

    if text.trim().is_empty() {
        return Err(LoadError::ExtractionService(format!(
            "extraction response has no readable text: {}",
            path.display()
        )));
    }

    info!(path = %path.display(), "extracted text via extraction service");
    Ok(text)
}

fn response_to_text(payload: &ExtractionResponse) -> String {
    if let Some(elements) = &payload.elements {
        let joined = elements
            .iter()
            .filter_map(|element| {
                element
                    .text
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        if !joined.is_empty() {
            return joined;
        }
    }

    payload
        .text
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn extract_pdf_native(path: &Path) -> Result<String, LoadError> {
    let document =
        PdfDocument::load(path).map_err(|error| LoadError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| LoadError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    if pages.is_empty() {
        return Err(LoadError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pages.join("\n\n"))
}

fn extract_slides_native(path: &Path) -> Result<String, LoadError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| LoadError::SlideParse(error.to_string()))?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort_by_key(|name| slide_number(name));

    if slide_names.is_empty() {
        return Err(LoadError::SlideParse(format!(
            "no slides found in {}",
            path.display()
        )));
    }

    // Text runs live in <a:t> elements of the slide XML.
    let run_re = Regex::new(r"<a:t>([^<]*)</a:t>")?;

    let mut slides = Vec::new();
    for name in slide_names {
        let mut entry = archive
            .by_name(&name)
            .map_err(|error| LoadError::SlideParse(error.to_string()))?;
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;

        let runs: Vec<&str> = run_re
            .captures_iter(&xml)
            .filter_map(|capture| capture.get(1).map(|m| m.as_str()))
            .filter(|run| !run.trim().is_empty())
            .collect();

        if !runs.is_empty() {
            slides.push(runs.join("\n"));
        }
    }

    if slides.is_empty() {
        return Err(LoadError::SlideParse(format!(
            "slide deck had no readable text: {}",
            path.display()
        )));
    }

    Ok(slides.join("\n\n"))
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn fake_pptx(slides: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();

        for (name, xml) in slides {
            writer.start_file(*name, options).unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn service_response_prefers_elements_over_raw_text() {
        let payload = ExtractionResponse {
            elements: Some(vec![
                ExtractionElement {
                    text: Some("  First ".to_string()),
                },
                ExtractionElement { text: None },
                ExtractionElement {
                    text: Some("Second".to_string()),
                },
            ]),
            text: Some("ignored".to_string()),
        };

        assert_eq!(response_to_text(&payload), "First\n\nSecond");
    }

    #[test]
    fn service_response_falls_back_to_raw_text() {
        let payload = ExtractionResponse {
            elements: Some(vec![ExtractionElement {
                text: Some("   ".to_string()),
            }]),
            text: Some(" whole document ".to_string()),
        };

        assert_eq!(response_to_text(&payload), "whole document");
    }

    #[test]
    fn slide_text_runs_are_collected_in_slide_order() {
        let file = fake_pptx(&[
            (
                "ppt/slides/slide2.xml",
                "<p:sp><a:t>Second slide</a:t></p:sp>",
            ),
            (
                "ppt/slides/slide1.xml",
                "<p:sp><a:t>Title</a:t><a:t>Body text</a:t></p:sp>",
            ),
        ]);

        let text = extract_slides_native(file.path()).unwrap();
        assert_eq!(text, "Title\nBody text\n\nSecond slide");
    }

    #[test]
    fn deck_without_text_runs_is_an_error() {
        let file = fake_pptx(&[("ppt/slides/slide1.xml", "<p:sp></p:sp>")]);
        let result = extract_slides_native(file.path());
        assert!(matches!(result, Err(LoadError::SlideParse(_))));
    }

    #[test]
    fn unreadable_pdf_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4\n%broken").unwrap();

        let result = extract_pdf_native(file.path());
        assert!(matches!(result, Err(LoadError::PdfParse(_))));
    }

    #[test]
    fn slide_numbers_sort_numerically() {
        assert_eq!(slide_number("ppt/slides/slide10.xml"), 10);
        assert!(slide_number("ppt/slides/slideX.xml") > 100);
    }
}
