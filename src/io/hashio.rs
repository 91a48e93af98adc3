// Reading hashes from text.
//
// Accepted line shapes, one hash per line:
//   f8f8...9b22
//   f8f8...9b22,file1.jpg
//   hash=f8f8...9b22,quality=100,filename=file1.jpg
//   filename=file1.jpg,quality=87,hash=f8f8...9b22,clidx=3,d=12
// Blank lines and lines starting with '#' are skipped.

use crate::core::duplicate::LabeledHash;
use crate::core::hash::{Hash256, HashError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const HASH_PREFIX: &str = "hash=";
const HASH_FILE_EXTENSIONS: [&str; 4] = ["txt", "dkvp", "csv", "pdq"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("{path}:{line}: {error}")]
    Malformed {
        path: String,
        line: usize,
        #[source]
        error: HashError,
    },

    #[error("{path}:{line}: missing \"{field}\" field")]
    MissingField {
        path: String,
        line: usize,
        field: String,
    },

    #[error("{path}:{line}: quality \"{value}\" is not a number")]
    InvalidQuality {
        path: String,
        line: usize,
        value: String,
    },
}

/// Ordered fields from one DKVP line. Fields without `=` are kept
/// positional and have no key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkvpRecord {
    fields: Vec<(Option<String>, String)>,
}

impl DkvpRecord {
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let fields = text
            .split(',')
            .map(|field| match field.split_once('=') {
                Some((k, v)) => (Some(k.to_string()), v.to_string()),
                None => (None, field.to_string()),
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v.as_str())
    }

    /// Drops keyed fields named in `keys`. Positional fields always stay.
    pub fn without(&self, keys: &[&str]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| k.as_deref().is_none_or(|k| !keys.contains(&k)))
                .cloned()
                .collect(),
        }
    }

    pub fn fields(&self) -> &[(Option<String>, String)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for DkvpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match k {
                Some(k) => write!(f, "{}={}", k, v)?,
                None => write!(f, "{}", v)?,
            }
        }
        Ok(())
    }
}

/// A loaded hash plus whatever came with it on its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub id: String,
    pub hash: Hash256,
    /// The line minus its hash field, verbatim.
    pub metadata: String,
    pub fields: DkvpRecord,
}

impl HashRecord {
    pub fn labeled(&self) -> LabeledHash {
        LabeledHash::new(self.id.clone(), self.hash)
    }

    /// Metadata when the line had any, the identifier otherwise.
    pub fn label(&self) -> &str {
        if self.metadata.is_empty() {
            &self.id
        } else {
            &self.metadata
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// DKVP key whose value identifies a record. Falls back to the line's
    /// metadata, then to `idx=<n>`.
    pub id_field: Option<String>,
    /// Records with a `quality` below this are skipped.
    pub min_quality: Option<u32>,
}

pub struct HashLoader {
    options: LoadOptions,
    records: Vec<HashRecord>,
    skipped: usize,
}

impl HashLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            records: Vec::new(),
            skipped: 0,
        }
    }

    pub fn load_reader<R: BufRead>(&mut self, path: &str, reader: R) -> Result<(), LoadError> {
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|error| LoadError::Io {
                path: path.to_string(),
                error,
            })?;
            let counter = self.records.len() + 1;
            if let Some(record) = self.parse_line(path, n + 1, &line, counter)? {
                self.records.push(record);
            }
        }
        Ok(())
    }

    /// Loads a file, or every hash file found under a directory.
    pub fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        if path.is_dir() {
            for file in discover(path) {
                self.load_file(&file)?;
            }
            Ok(())
        } else {
            self.load_file(path)
        }
    }

    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), LoadError> {
        for path in paths {
            self.load_path(path.as_ref())?;
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|error| LoadError::Io {
            path: name.clone(),
            error,
        })?;
        let before = self.records.len();
        self.load_reader(&name, BufReader::new(file))?;
        log::debug!("loaded {} hashes from {}", self.records.len() - before, name);
        Ok(())
    }

    pub fn records(&self) -> &[HashRecord] {
        &self.records
    }

    /// Records dropped by the quality filter so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> Vec<HashRecord> {
        if self.skipped > 0 {
            log::info!("skipped {} hashes below minimum quality", self.skipped);
        }
        self.records
    }

    fn parse_line(
        &mut self,
        path: &str,
        line_number: usize,
        line: &str,
        counter: usize,
    ) -> Result<Option<HashRecord>, LoadError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (head, rest) = line.split_once(',').unwrap_or((line, ""));
        let (hex, metadata, fields) = if let Some(hex) = head.strip_prefix(HASH_PREFIX) {
            (hex, rest.to_string(), DkvpRecord::parse(rest))
        } else if head.contains('=') {
            let record = DkvpRecord::parse(line);
            let hex = record
                .get("hash")
                .map(str::to_string)
                .ok_or_else(|| LoadError::MissingField {
                    path: path.to_string(),
                    line: line_number,
                    field: "hash".to_string(),
                })?;
            let fields = record.without(&["hash"]);
            let hash = parse_hash(path, line_number, &hex)?;
            return self.finish_record(path, line_number, hash, fields.to_string(), fields, counter);
        } else {
            (head, rest.to_string(), DkvpRecord::parse(rest))
        };

        let hash = parse_hash(path, line_number, hex)?;
        self.finish_record(path, line_number, hash, metadata, fields, counter)
    }

    fn finish_record(
        &mut self,
        path: &str,
        line_number: usize,
        hash: Hash256,
        metadata: String,
        fields: DkvpRecord,
        counter: usize,
    ) -> Result<Option<HashRecord>, LoadError> {
        if let (Some(min), Some(value)) = (self.options.min_quality, fields.get("quality")) {
            let quality: u32 = value.parse().map_err(|_| LoadError::InvalidQuality {
                path: path.to_string(),
                line: line_number,
                value: value.to_string(),
            })?;
            if quality < min {
                log::debug!("{}:{}: quality {} below {}", path, line_number, quality, min);
                self.skipped += 1;
                return Ok(None);
            }
        }

        let id = match &self.options.id_field {
            Some(key) => fields
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| LoadError::MissingField {
                    path: path.to_string(),
                    line: line_number,
                    field: key.clone(),
                })?,
            None if !metadata.is_empty() => metadata.clone(),
            None => format!("idx={}", counter),
        };

        Ok(Some(HashRecord {
            id,
            hash,
            metadata,
            fields,
        }))
    }
}

fn parse_hash(path: &str, line: usize, hex: &str) -> Result<Hash256, LoadError> {
    Hash256::from_hex_string(hex).map_err(|error| LoadError::Malformed {
        path: path.to_string(),
        line,
        error,
    })
}

/// Recursively collects hash files under `dir`, sorted by path.
pub fn discover(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| HASH_FILE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}

pub fn to_labeled(records: &[HashRecord]) -> Vec<LabeledHash> {
    records.iter().map(HashRecord::labeled).collect()
}
