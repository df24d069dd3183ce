use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{extract_units, SUPPORTED_EXTENSIONS};
use crate::{Chunk, IngestError, RagConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_documents(path));
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(IngestError::InvalidArgument(format!(
                "{} does not exist",
                path.display()
            )));
        }
    }
    Ok(files)
}

pub fn process_document(path: &Path, config: ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let mut chunks = Vec::new();
    for unit in extract_units(path)? {
        if unit.text.trim().is_empty() {
            continue;
        }
        chunks.extend(build_chunks(file_name, unit.label.as_deref(), &unit.text, config));
    }

    if chunks.is_empty() {
        warn!(path = %path.display(), "no text extracted");
    }
    Ok(chunks)
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub checksum: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub chunks: Vec<Chunk>,
    pub files: Vec<IngestedFile>,
    pub ingested_at: DateTime<Utc>,
}

/// The first file that cannot be read or parsed aborts the whole batch.
pub fn ingest_paths(paths: &[PathBuf], config: &RagConfig) -> Result<IngestionReport, IngestError> {
    config.validate()?;
    let files = expand_paths(paths)?;

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no supported documents found".to_string(),
        ));
    }

    let chunking = ChunkingConfig::from(config);
    let mut chunks = Vec::new();
    let mut ingested = Vec::new();

    for path in files {
        let processed = digest_file(&path)
            .and_then(|checksum| Ok((checksum, process_document(&path, chunking)?)));

        match processed {
            Ok((checksum, file_chunks)) => {
                debug!(path = %path.display(), chunk_count = file_chunks.len(), "processed document");
                ingested.push(IngestedFile {
                    path,
                    checksum,
                    chunk_count: file_chunks.len(),
                });
                chunks.extend(file_chunks);
            }
            Err(error) => {
                return Err(IngestError::Document {
                    path: path.display().to_string(),
                    source: Box::new(error),
                })
            }
        }
    }

    if chunks.is_empty() {
        return Err(IngestError::EmptyDocumentSet);
    }

    Ok(IngestionReport {
        chunks,
        files: ingested,
        ingested_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::{digest_file, discover_documents, ingest_paths, process_document};
    use crate::chunking::ChunkingConfig;
    use crate::{IngestError, RagConfig};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_documents_is_recursive_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.txt")).and_then(|mut file| file.write_all(b"alpha"))?;
        File::create(nested.join("b.CSV")).and_then(|mut file| file.write_all(b"x,y\n1,2"))?;
        File::create(nested.join("c.png")).and_then(|mut file| file.write_all(b"\x89PNG"))?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn text_document_sources_are_numbered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.txt");
        fs::write(&path, "x".repeat(250))?;

        let chunks = process_document(
            &path,
            ChunkingConfig {
                chunk_size: 100,
                overlap: 20,
            },
        )?;
        let sources: Vec<&str> = chunks.iter().map(|chunk| chunk.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["doc.txt (Chunk 1)", "doc.txt (Chunk 2)", "doc.txt (Chunk 3)"]
        );
        Ok(())
    }

    #[test]
    fn ingestion_fails_without_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = ingest_paths(&[dir.path().to_path_buf()], &RagConfig::default());
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn one_bad_file_aborts_the_batch() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.txt"), "A perfectly readable file.")?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let result = ingest_paths(&[dir.path().to_path_buf()], &RagConfig::default());
        match result {
            Err(IngestError::Document { path, .. }) => assert!(path.ends_with("unreadable.pdf")),
            other => panic!("expected document error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn blank_documents_produce_an_empty_set() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.txt");
        fs::write(&path, "   \n\n  ")?;

        let result = ingest_paths(&[path], &RagConfig::default());
        assert!(matches!(result, Err(IngestError::EmptyDocumentSet)));
        Ok(())
    }

    #[test]
    fn report_lists_every_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "First file.")?;
        fs::write(dir.path().join("b.csv"), "name,value\nspeed,1500\n")?;

        let report = ingest_paths(&[dir.path().to_path_buf()], &RagConfig::default())?;
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.chunks.len(), 2);
        assert_eq!(report.chunks[0].source, "a.txt (Chunk 1)");
        assert_eq!(report.chunks[1].content, "name | value\nspeed | 1500");
        assert_eq!(report.files[1].checksum.len(), 64);
        Ok(())
    }
}
