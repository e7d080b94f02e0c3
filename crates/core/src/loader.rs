use crate::error::LoadError;
use crate::extract::{extract_pdf_text, extract_slides_text};
use crate::models::Document;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

const KEEP_FILE_PREFIX: &str = ".gitkeep";

/// Clears the staging directory when it goes out of scope, success or
/// failure, so a later run cannot index the same upload twice. The keep-file
/// sentinel survives.
struct StagingCleanup {
    dir: PathBuf,
}

impl StagingCleanup {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl Drop for StagingCleanup {
    fn drop(&mut self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };

        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name();
            let keep = name.to_string_lossy().starts_with(KEEP_FILE_PREFIX);

            if is_file && !keep {
                if let Err(err) = fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), %err, "failed to remove staged file");
                }
            }
        }

        info!(dir = %self.dir.display(), "staging directory cleared");
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>, LoadError> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

/// Reads every regular file under the directory (recursively) as UTF-8
/// text, one Document per readable file. Files that are not valid text are
/// skipped with a warning.
fn read_directory_documents(dir: &Path) -> Result<Vec<Document>, LoadError> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(KEEP_FILE_PREFIX) {
            continue;
        }

        match fs::read_to_string(entry.path()) {
            Ok(text) if !text.trim().is_empty() => documents.push(Document::new(text, name)),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                warn!(file = %name, "skipping non-text file in staging directory");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(documents)
}

/// Loads staged files into Documents, dispatching on extension. PDFs and
/// slide decks go through the extraction pipeline; the first file of any
/// other kind hands the whole directory to the generic reader and returns
/// immediately. The staging directory is emptied on exit regardless of
/// outcome.
pub fn load_documents(staging_dir: &Path) -> Result<Vec<Document>, LoadError> {
    let _cleanup = StagingCleanup::new(staging_dir);

    let mut documents = Vec::new();

    for entry in sorted_entries(staging_dir)? {
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(KEEP_FILE_PREFIX) {
            continue;
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = match extension.as_str() {
            "pdf" => extract_pdf_text(&path).map_err(|err| {
                error!(file = %name, %err, "pdf extraction failed");
                err
            })?,
            "pptx" => extract_slides_text(&path).map_err(|err| {
                error!(file = %name, %err, "slide extraction failed");
                err
            })?,
            _ => {
                let all = read_directory_documents(staging_dir)?;
                info!(count = all.len(), "loaded documents via generic directory reader");
                return Ok(all);
            }
        };

        if !text.trim().is_empty() {
            documents.push(Document::new(text, name));
        }
    }

    info!(count = documents.len(), dir = %staging_dir.display(), "loaded documents from staging");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn regular_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn text_files_load_and_staging_is_cleared() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha notes").unwrap();
        fs::write(dir.path().join("b.txt"), "beta notes").unwrap();
        fs::write(dir.path().join(".gitkeep"), "").unwrap();

        let documents = load_documents(dir.path()).unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].metadata.file_name, "a.txt");
        assert_eq!(documents[0].text, "alpha notes");
        assert_eq!(regular_files(dir.path()), vec![".gitkeep".to_string()]);
    }

    #[test]
    fn staging_is_cleared_even_when_extraction_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4\n%broken").unwrap();
        fs::write(dir.path().join(".gitkeep"), "").unwrap();

        let result = load_documents(dir.path());

        assert!(result.is_err());
        assert_eq!(regular_files(dir.path()), vec![".gitkeep".to_string()]);
    }

    #[test]
    fn generic_reader_recurses_but_cleanup_is_top_level() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.txt"), "hidden").unwrap();
        fs::write(dir.path().join("notes.txt"), "visible").unwrap();

        let documents = load_documents(dir.path()).unwrap();

        assert_eq!(documents.len(), 2);
        assert!(documents.iter().any(|d| d.text == "hidden"));
        assert!(documents.iter().any(|d| d.text == "visible"));
        // Only the staging directory itself is emptied.
        assert!(dir.path().join("nested").join("inner.txt").exists());
        assert!(regular_files(dir.path()).is_empty());
    }

    #[test]
    fn generic_reader_short_circuits_for_mixed_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# heading").unwrap();
        fs::write(dir.path().join("z.csv"), "col1,col2").unwrap();

        let documents = load_documents(dir.path()).unwrap();

        assert_eq!(documents.len(), 2);
        assert!(regular_files(dir.path()).is_empty());
    }

    #[test]
    fn non_utf8_files_are_skipped_by_generic_reader() {
        let dir = tempdir().unwrap();
        let mut binary = File::create(dir.path().join("blob.bin")).unwrap();
        binary.write_all(&[0xff, 0xfe, 0x00, 0x80]).unwrap();
        fs::write(dir.path().join("ok.txt"), "fine").unwrap();

        let documents = load_documents(dir.path()).unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata.file_name, "ok.txt");
    }

    #[test]
    fn empty_staging_directory_yields_no_documents() {
        let dir = tempdir().unwrap();
        let documents = load_documents(dir.path()).unwrap();
        assert!(documents.is_empty());
    }
}
