// src/store/file.rs
// Local CSV file as the backing table. Appends go to the end of the file,
// updates rewrite it through a temp file + rename.

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::{
    csv::{parse_rows, rows_to_string, write_row, SEP},
    error::BackendError,
    record::RowPosition,
};

use super::TableBackend;

pub struct CsvTable {
    path: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn text(&self) -> Result<String, BackendError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    fn load(&self) -> Result<Vec<Vec<String>>, BackendError> {
        Ok(parse_rows(&self.text()?, SEP))
    }

    fn save(&self, rows: &[Vec<String>]) -> Result<(), BackendError> {
        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, rows_to_string(rows, SEP)).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

fn io_error(path: &Path, e: io::Error) -> BackendError {
    let msg = format!("{}: {e}", path.display());
    match e.kind() {
        ErrorKind::PermissionDenied => BackendError::Auth(msg),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => BackendError::Transient(msg),
        _ => BackendError::Rejected(msg),
    }
}

impl TableBackend for CsvTable {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn ensure_table(&mut self) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
        }
        if !self.path.exists() {
            fs::write(&self.path, "").map_err(|e| io_error(&self.path, e))?;
        }
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<Vec<String>>, BackendError> {
        self.load()
    }

    fn write_header(&mut self, header: &[String]) -> Result<(), BackendError> {
        let mut rows = self.load()?;
        match rows.first_mut() {
            Some(first) => *first = header.to_vec(),
            None => rows.push(header.to_vec()),
        }
        self.save(&rows)
    }

    fn append_rows(&mut self, rows: &[Vec<String>]) -> Result<RowPosition, BackendError> {
        let text = self.text()?;
        let existing = parse_rows(&text, SEP).len().max(1);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        let mut out = BufWriter::new(file);
        // Hand-edited files often lack the final newline.
        if !text.is_empty() && !text.ends_with('\n') {
            out.write_all(b"\n").map_err(|e| io_error(&self.path, e))?;
        }
        for row in rows {
            write_row(&mut out, row, SEP).map_err(|e| io_error(&self.path, e))?;
        }
        out.flush().map_err(|e| io_error(&self.path, e))?;
        Ok(RowPosition::new(existing as u32 + 1))
    }

    fn update_rows(&mut self, updates: &[(RowPosition, Vec<String>)]) -> Result<(), BackendError> {
        let mut rows = self.load()?;
        for (pos, cells) in updates {
            let idx = pos.get() as usize - 1;
            if idx == 0 || idx >= rows.len() {
                return Err(BackendError::Rejected(format!("{pos} is outside {}", self.path.display())));
            }
            rows[idx] = cells.clone();
        }
        self.save(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_update_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = CsvTable::new(dir.path().join("nested/agreements.csv"));
        t.ensure_table().unwrap();
        assert!(t.read_all().unwrap().is_empty());

        t.write_header(&row!["key", "country"]).unwrap();
        let start = t.append_rows(&[row!["k1", "Chad"], row!["k2", "Congo, Rep."]]).unwrap();
        assert_eq!(start, RowPosition::FIRST_DATA);

        t.update_rows(&[(RowPosition::new(3), row!["k2", "Congo, Republic of"])]).unwrap();
        assert_eq!(
            t.read_all().unwrap(),
            vec![row!["key", "country"], row!["k1", "Chad"], row!["k2", "Congo, Republic of"]]
        );
        assert_eq!(t.row_count().unwrap(), 3);
    }

    #[test]
    fn append_after_file_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.csv");
        fs::write(&path, "key,country\nk1,Chad").unwrap();
        let mut t = CsvTable::new(&path);

        let start = t.append_rows(&[row!["k2", "Togo"]]).unwrap();
        assert_eq!(start, RowPosition::new(3));
        assert_eq!(
            t.read_all().unwrap(),
            vec![row!["key", "country"], row!["k1", "Chad"], row!["k2", "Togo"]]
        );
    }

    #[test]
    fn header_row_is_not_updatable() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = CsvTable::new(dir.path().join("a.csv"));
        t.write_header(&row!["key"]).unwrap();
        assert!(t.update_rows(&[(RowPosition::HEADER, row!["x"])]).is_err());
    }
}
