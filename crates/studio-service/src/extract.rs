//! Plain-text extraction from uploaded files.

use std::io::{Cursor, Read};

use regex::Regex;
use tracing::debug;

use studio_core::{FileType, Result, StudioError};

/// Extract the text of an uploaded file.
pub async fn extract_text(file_type: FileType, filename: &str, bytes: Vec<u8>) -> Result<String> {
    let text = match file_type {
        FileType::Pdf => extract_pdf(filename, bytes).await?,
        FileType::Docx => extract_docx(filename, &bytes)?,
        FileType::Txt | FileType::Md => String::from_utf8(bytes)
            .map_err(|_| StudioError::extraction(filename, "File is not valid UTF-8 text"))?,
        FileType::Youtube => {
            return Err(StudioError::invalid_argument(
                "Video transcripts are not uploaded as files",
            ))
        }
    };

    debug!("Extracted {} chars from {}", text.len(), filename);
    Ok(text)
}

async fn extract_pdf(filename: &str, bytes: Vec<u8>) -> Result<String> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| StudioError::internal(format!("Task join error: {}", e)))?
        .map_err(|e| {
            StudioError::extraction(
                filename,
                format!("The uploaded file is not a valid PDF or is corrupted: {}", e),
            )
        })?;

    Ok(text.trim().to_string())
}

fn extract_docx(filename: &str, bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| StudioError::extraction(filename, format!("Not a DOCX archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| StudioError::extraction(filename, format!("Missing document body: {}", e)))?
        .read_to_string(&mut xml)?;

    let text = docx_xml_text(&xml)?;
    if text.is_empty() {
        return Err(StudioError::extraction(
            filename,
            "No text content could be extracted from the DOCX file.",
        ));
    }
    Ok(text)
}

/// Text runs of a WordprocessingML body, paragraphs separated by blank lines.
pub fn docx_xml_text(xml: &str) -> Result<String> {
    let re = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:tab/>|<w:br/>")
        .map_err(|e| StudioError::internal(e.to_string()))?;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for caps in re.captures_iter(xml) {
        match (caps.get(1), caps.get(0).map(|m| m.as_str())) {
            (Some(run), _) => current.push_str(&unescape_xml(run.as_str())),
            (None, Some("</w:p>")) => {
                let paragraph = std::mem::take(&mut current);
                if !paragraph.trim().is_empty() {
                    paragraphs.push(paragraph);
                }
            }
            (None, Some("<w:tab/>")) => current.push('\t'),
            (None, _) => current.push('\n'),
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n\n").trim().to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(xml_body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            xml_body
        );
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_xml_text() {
        let xml = r#"<w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> revenue &amp; costs</w:t></w:r></w:p><w:p></w:p><w:p><w:r><w:t>Revenue grew 12%.</w:t><w:tab/><w:t>Costs fell.</w:t></w:r></w:p>"#;
        assert_eq!(
            docx_xml_text(xml).unwrap(),
            "Quarterly revenue & costs\n\nRevenue grew 12%.\tCosts fell."
        );
    }

    #[tokio::test]
    async fn test_extract_docx() {
        let bytes = docx_bytes("<w:p><w:r><w:t>Hello from Word</w:t></w:r></w:p>");
        let text = extract_text(FileType::Docx, "memo.docx", bytes).await.unwrap();
        assert_eq!(text, "Hello from Word");
    }

    #[tokio::test]
    async fn test_extract_empty_docx() {
        let bytes = docx_bytes("<w:p></w:p>");
        let err = extract_text(FileType::Docx, "blank.docx", bytes).await.unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_FAILED");
    }

    #[tokio::test]
    async fn test_extract_plain_text() {
        let text = extract_text(FileType::Md, "notes.md", b"# Title\n\nBody".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "# Title\n\nBody");

        let err = extract_text(FileType::Txt, "bin.txt", vec![0xff, 0xfe, 0x00])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_extract_rejects_bad_input() {
        let err = extract_text(FileType::Docx, "fake.docx", b"not a zip".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_FAILED");

        let err = extract_text(FileType::Youtube, "clip", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
