use crate::error::IngestError;
use calamine::Reader as _;
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUnit {
    pub label: Option<String>,
    pub text: String,
}

impl ExtractedUnit {
    fn whole(text: String) -> Self {
        Self { label: None, text }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Xlsx,
    Xls,
    Docx,
    Text,
    Csv,
}

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["pdf", "xlsx", "xls", "docx", "txt", "csv"];

impl DocumentKind {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "xlsx" => Ok(Self::Xlsx),
            "docx" => Ok(Self::Docx),
            "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "xls" => Ok(Self::Xls),
            "" => Err(IngestError::UnsupportedFormat(format!(
                "{} has no extension",
                path.display()
            ))),
            other => Err(IngestError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn extractor(self) -> &'static dyn DocumentExtractor {
        match self {
            Self::Pdf => &LopdfExtractor,
            Self::Xlsx => &XlsxExtractor,
            Self::Xls => &XlsExtractor,
            Self::Docx => &DocxExtractor,
            Self::Text => &PlainTextExtractor,
            Self::Csv => &CsvExtractor,
        }
    }
}

pub trait DocumentExtractor: Sync {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError>;
}

pub fn extract_units(path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
    DocumentKind::from_path(path)?.extractor().extract_units(path)
}

#[derive(Default)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(ExtractedUnit {
                    label: Some(format!("Page {page_no}")),
                    text,
                });
            }
        }

        Ok(pages)
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let text = std::fs::read_to_string(path)?;
        Ok(vec![ExtractedUnit::whole(text)])
    }
}

#[derive(Default)]
pub struct CsvExtractor;

impl DocumentExtractor for CsvExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;

        let mut lines = Vec::new();
        let headers = reader.headers()?.iter().collect::<Vec<_>>().join(" | ");
        if !headers.trim().is_empty() {
            lines.push(headers);
        }
        for record in reader.records() {
            lines.push(record?.iter().collect::<Vec<_>>().join(" | "));
        }

        Ok(vec![ExtractedUnit::whole(lines.join("\n"))])
    }
}

#[derive(Default)]
pub struct DocxExtractor;

impl DocumentExtractor for DocxExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let bytes = std::fs::read(path)?;
        let mut archive = open_archive(&bytes)?;
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
        Ok(vec![ExtractedUnit::whole(docx_paragraphs(&xml)?)])
    }
}

/// Joins `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|error| IngestError::OfficeParse(error.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(error) => return Err(IngestError::OfficeParse(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

#[derive(Default)]
pub struct XlsxExtractor;

impl DocumentExtractor for XlsxExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let bytes = std::fs::read(path)?;
        let mut archive = open_archive(&bytes)?;

        let shared_strings = if archive.file_names().any(|name| name == "xl/sharedStrings.xml") {
            let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
            read_shared_strings(&xml)?
        } else {
            Vec::new()
        };
        let sheets = {
            let xml = read_zip_entry_bounded(&mut archive, "xl/workbook.xml")?;
            read_workbook_sheets(&xml)?
        };
        let relationships = if archive
            .file_names()
            .any(|name| name == "xl/_rels/workbook.xml.rels")
        {
            let xml = read_zip_entry_bounded(&mut archive, "xl/_rels/workbook.xml.rels")?;
            read_relationships(&xml)?
        } else {
            HashMap::new()
        };

        // Parts named sheetN.xml, in N order, stand in when a sheet has no resolvable relationship.
        let mut numbered: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
            .map(str::to_string)
            .collect();
        numbered.sort_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });

        let parts: Vec<(String, String)> = if sheets.is_empty() {
            numbered
                .into_iter()
                .enumerate()
                .map(|(position, part)| (format!("Sheet{}", position + 1), part))
                .collect()
        } else {
            sheets
                .into_iter()
                .enumerate()
                .filter_map(|(position, sheet)| {
                    sheet
                        .relationship
                        .as_deref()
                        .and_then(|id| relationships.get(id))
                        .map(|target| resolve_part(target))
                        .or_else(|| numbered.get(position).cloned())
                        .map(|part| (sheet.name, part))
                })
                .collect()
        };

        let mut units = Vec::new();
        for (name, part) in parts {
            let xml = read_zip_entry_bounded(&mut archive, &part)?;
            let text = sheet_rows(&xml, &shared_strings)?;
            if text.trim().is_empty() {
                continue;
            }
            units.push(ExtractedUnit {
                label: Some(format!("Sheet: {name}")),
                text,
            });
        }

        Ok(units)
    }
}

#[derive(Default)]
pub struct XlsExtractor;

impl DocumentExtractor for XlsExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<ExtractedUnit>, IngestError> {
        let mut workbook: calamine::Xls<_> = calamine::open_workbook(path)
            .map_err(|error: calamine::XlsError| IngestError::OfficeParse(error.to_string()))?;

        let mut units = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|error| IngestError::OfficeParse(format!("{name}: {error}")))?;

            let rows: Vec<String> = range
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.to_string().trim().to_string())
                        .filter(|cell| !cell.is_empty())
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .filter(|line| !line.is_empty())
                .collect();
            if rows.is_empty() {
                continue;
            }
            units.push(ExtractedUnit {
                label: Some(format!("Sheet: {name}")),
                text: rows.join("\n"),
            });
        }

        Ok(units)
    }
}

struct WorkbookSheet {
    name: String,
    relationship: Option<String>,
}

fn read_workbook_sheets(xml: &[u8]) -> Result<Vec<WorkbookSheet>, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut relationship = None;
                for attribute in e.attributes().filter_map(Result::ok) {
                    let value = String::from_utf8_lossy(&attribute.value).into_owned();
                    match attribute.key.local_name().as_ref() {
                        b"name" => name = Some(value),
                        b"id" => relationship = Some(value),
                        _ => {}
                    }
                }
                if let Some(name) = name {
                    sheets.push(WorkbookSheet { name, relationship });
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(IngestError::OfficeParse(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn read_relationships(xml: &[u8]) -> Result<HashMap<String, String>, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attribute in e.attributes().filter_map(Result::ok) {
                    let value = String::from_utf8_lossy(&attribute.value).into_owned();
                    match attribute.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(IngestError::OfficeParse(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

// Workbook relationship targets are relative to `xl/` unless absolute.
fn resolve_part(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|error| IngestError::OfficeParse(error.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(IngestError::OfficeParse(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut shared = false;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().filter_map(Result::ok).any(|attribute| {
                        attribute.key.as_ref() == b"t" && attribute.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te
                    .unescape()
                    .map_err(|error| IngestError::OfficeParse(error.to_string()))?;
                let value = raw.trim();
                if shared {
                    if let Some(text) = value
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| shared_strings.get(index))
                    {
                        row.push(text.clone());
                    }
                } else if !value.is_empty() {
                    row.push(value.to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" | "));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => return Err(IngestError::OfficeParse(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows.join("\n"))
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>, IngestError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| IngestError::OfficeParse(error.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, IngestError> {
    let entry = archive
        .by_name(name)
        .map_err(|error| IngestError::OfficeParse(format!("{name}: {error}")))?;
    read_bounded(entry, name, MAX_XML_ENTRY_BYTES)
}

fn read_bounded(reader: impl Read, name: &str, limit: u64) -> Result<Vec<u8>, IngestError> {
    let mut out = Vec::new();
    reader.take(limit + 1).read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(IngestError::OfficeParse(format!(
            "{name} exceeds size limit ({limit} bytes)"
        )));
    }
    Ok(out)
}
