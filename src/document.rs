//! Prescription document rendering.
//!
//! Renders the field store plus the facility header into a paginated plain
//! text document and writes it to disk. Pages hold a fixed number of lines;
//! long values wrap at the text width before pagination.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::fields::{Field, FieldMap, FieldValue};

/// Lines per page, header included.
const PAGE_LINES: usize = 48;

/// Wrap width for long values (symptoms in particular run on).
const TEXT_WIDTH: usize = 80;

/// Prerequisites checked before any rendering happens. Each variant maps to
/// its own notification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Please extract the information before generating the document")]
    MissingExtraction,
    #[error("Please enter the facility name before generating the document")]
    MissingFacilityName,
}

/// A rendered document: ordered pages of lines.
#[derive(Debug, PartialEq, Eq)]
pub struct Document {
    pub pages: Vec<Vec<String>>,
    pub file_name: String,
}

/// Render the prescription. Fails without touching the filesystem when a
/// prerequisite is missing.
pub fn render(fields: Option<&FieldMap>, facility_name: &str) -> Result<Document, DocumentError> {
    let fields = fields.ok_or(DocumentError::MissingExtraction)?;
    if facility_name.trim().is_empty() {
        return Err(DocumentError::MissingFacilityName);
    }

    let mut lines = Vec::new();
    lines.push(facility_name.trim().to_string());
    lines.push(format!("Date: {}", timestamp()));
    lines.push("-".repeat(TEXT_WIDTH));
    lines.push(String::new());

    section(&mut lines, "Patient Information", |lines| {
        for field in [Field::PersonName, Field::PersonAge, Field::PersonGender] {
            lines.push(format!("{}: {}", field.label(), fields.get(field).display()));
        }
    });

    section(&mut lines, "Doctor Information", |lines| {
        lines.push(format!("{}: {}", Field::DoctorName.label(), fields.get(Field::DoctorName).display()));
    });

    section(&mut lines, "Past Tests", |lines| {
        wrap_into(lines, &fields.get(Field::PastTests).display());
    });

    section(&mut lines, "Symptoms", |lines| {
        wrap_into(lines, &fields.get(Field::Symptoms).display());
    });

    section(&mut lines, "Recommended Doses", |lines| {
        list_into(lines, fields.get(Field::RecommendedDoses));
    });

    section(&mut lines, "Medicine Names", |lines| {
        list_into(lines, fields.get(Field::MedicineNames));
    });

    Ok(Document { pages: paginate(lines), file_name: file_name(fields, facility_name) })
}

impl Document {
    /// Write the document under `dir`, pages separated by form feeds.
    ///
    /// # Returns
    /// The path of the written file.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        let body = self.pages.iter().map(|page| page.join("\n")).collect::<Vec<_>>().join("\n\u{c}\n");
        std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Derive the output filename: `{person}_{doctor}_{facility}_prescription.txt`
/// with whitespace runs collapsed to underscores.
pub fn file_name(fields: &FieldMap, facility_name: &str) -> String {
    let raw = format!(
        "{}_{}_{}_prescription.txt",
        fields.get(Field::PersonName).display(),
        fields.get(Field::DoctorName).display(),
        facility_name.trim()
    );
    // Literal pattern, cannot fail to compile
    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(&raw, "_").into_owned()
}

fn section(lines: &mut Vec<String>, title: &str, body: impl FnOnce(&mut Vec<String>)) {
    lines.push(format!("== {} ==", title));
    body(lines);
    lines.push(String::new());
}

/// One list element per line; scalar fallbacks render as a wrapped paragraph.
fn list_into(lines: &mut Vec<String>, value: &FieldValue) {
    match value {
        FieldValue::List(items) => {
            for item in items {
                wrap_into(lines, item);
            }
        }
        FieldValue::Text(text) => wrap_into(lines, text),
    }
}

/// Greedy word wrap at [`TEXT_WIDTH`].
fn wrap_into(lines: &mut Vec<String>, text: &str) {
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > TEXT_WIDTH {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || text.trim().is_empty() {
        lines.push(current);
    }
}

/// Split lines into pages of at most [`PAGE_LINES`] lines.
fn paginate(lines: Vec<String>) -> Vec<Vec<String>> {
    if lines.is_empty() {
        return vec![Vec::new()];
    }
    lines.chunks(PAGE_LINES).map(|chunk| chunk.to_vec()).collect()
}

fn timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).unwrap_or_else(|_| now.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldMap;

    fn sample_fields() -> FieldMap {
        let mut fields = FieldMap::with_sentinels();
        fields.set_from_text(Field::PersonName, "John Ray Smith");
        fields.set_from_text(Field::DoctorName, "Dr. Jane Doe");
        fields.set_from_text(Field::Symptoms, "fever and dry cough");
        fields.set_from_text(Field::RecommendedDoses, "Paracetamol: 500mg twice daily\nIbuprofen: as needed");
        fields.set_from_text(Field::MedicineNames, "Paracetamol\nIbuprofen");
        fields
    }

    #[test]
    fn missing_extraction_and_facility_are_distinct_errors() {
        assert_eq!(render(None, "City Clinic").unwrap_err(), DocumentError::MissingExtraction);
        let fields = sample_fields();
        assert_eq!(render(Some(&fields), "   ").unwrap_err(), DocumentError::MissingFacilityName);
    }

    #[test]
    fn filename_collapses_whitespace_to_underscores() {
        let fields = sample_fields();
        assert_eq!(file_name(&fields, "City  General Hospital"), "John_Ray_Smith_Dr._Jane_Doe_City_General_Hospital_prescription.txt");
    }

    #[test]
    fn document_contains_all_sections_in_order() {
        let fields = sample_fields();
        let doc = render(Some(&fields), "City Clinic").unwrap();
        let flat: Vec<&String> = doc.pages.iter().flatten().collect();
        let titles = ["== Patient Information ==", "== Doctor Information ==", "== Past Tests ==", "== Symptoms ==", "== Recommended Doses ==", "== Medicine Names =="];
        let mut last = 0;
        for title in titles {
            let pos = flat.iter().position(|l| l.as_str() == title).unwrap_or_else(|| panic!("missing section {}", title));
            assert!(pos >= last, "section {} out of order", title);
            last = pos;
        }
        assert_eq!(flat[0], "City Clinic");
    }

    #[test]
    fn doses_render_one_per_line() {
        let fields = sample_fields();
        let doc = render(Some(&fields), "City Clinic").unwrap();
        let flat: Vec<&String> = doc.pages.iter().flatten().collect();
        assert!(flat.iter().any(|l| l.as_str() == "Paracetamol: 500mg twice daily"));
        assert!(flat.iter().any(|l| l.as_str() == "Ibuprofen: as needed"));
    }

    #[test]
    fn long_content_page_breaks() {
        let mut fields = sample_fields();
        let many: Vec<String> = (0..200).map(|i| format!("Medicine {}", i)).collect();
        fields.set_from_text(Field::MedicineNames, &many.join("\n"));
        let doc = render(Some(&fields), "City Clinic").unwrap();
        assert!(doc.pages.len() > 1);
        for page in &doc.pages {
            assert!(page.len() <= PAGE_LINES);
        }
    }

    #[test]
    fn write_to_creates_the_file() {
        let fields = sample_fields();
        let doc = render(Some(&fields), "City Clinic").unwrap();
        let dir = std::env::temp_dir().join(format!("medscribe-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = doc.write_to(&dir).unwrap();
        assert!(path.exists());
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("City Clinic"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn wrap_breaks_long_lines() {
        let mut lines = Vec::new();
        let long = "word ".repeat(40);
        wrap_into(&mut lines, &long);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= TEXT_WIDTH);
        }
    }
}
