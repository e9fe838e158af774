// src/feed/tsv.rs

//! Reader for the tab-separated title export.
//!
//! ```text
//! tconst     titleType  primaryTitle  originalTitle  isAdult  startYear  endYear  runtimeMinutes  genres
//! tt0000001  short      Carmencita    Carmencita     0        1894       \N       1               Documentary,Short
//! ```
//!
//! Columns are located by header name; `\N` marks a null field. Gzip files
//! are recognized by their magic bytes and decompressed while reading.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;

use crate::error::{AppError, Result};
use crate::models::CatalogItem;

const NULL: &str = "\\N";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy)]
struct Columns {
    id: usize,
    title: usize,
    title_type: Option<usize>,
    original_title: Option<usize>,
    is_adult: Option<usize>,
    start_year: Option<usize>,
    genres: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| AppError::decode("feed header", format!("{name} column missing")))
        };

        Ok(Self {
            id: require("tconst")?,
            title: require("primaryTitle")?,
            title_type: find("titleType"),
            original_title: find("originalTitle"),
            is_adult: find("isAdult"),
            start_year: find("startYear"),
            genres: find("genres"),
        })
    }
}

/// Lazy, single-pass iterator over feed rows.
///
/// Rows that fail to decode are skipped and counted. An I/O failure ends
/// iteration and is kept for [`take_error`](Self::take_error).
pub struct TsvFeed<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Columns,
    read: usize,
    failed: usize,
    error: Option<csv::Error>,
}

impl TsvFeed<Box<dyn Read + Send>> {
    /// Open a feed file, plain or gzip-compressed.
    pub fn open(path: impl AsRef<Path>, delimiter: char) -> Result<Self> {
        let path = path.as_ref();
        let mut file = BufReader::with_capacity(1 << 20, File::open(path)?);
        let reader: Box<dyn Read + Send> = if file.fill_buf()?.starts_with(&GZIP_MAGIC) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::from_reader(reader, delimiter)
    }
}

impl<R: Read> TsvFeed<R> {
    pub fn from_reader(reader: R, delimiter: char) -> Result<Self> {
        let delimiter = u8::try_from(delimiter)
            .map_err(|_| AppError::config(format!("feed delimiter {delimiter:?} is not ASCII")))?;

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .quoting(false)
            .flexible(true)
            .from_reader(reader);
        let columns = Columns::from_headers(reader.headers()?)?;

        Ok(Self {
            records: reader.into_records(),
            columns,
            read: 0,
            failed: 0,
            error: None,
        })
    }

    /// Rows successfully decoded so far.
    pub fn read(&self) -> usize {
        self.read
    }

    /// Rows skipped so far.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// The I/O error that ended iteration early, if any.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take().map(AppError::from)
    }

    fn decode(&self, record: &StringRecord) -> Option<CatalogItem> {
        let field = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .filter(|value| *value != NULL && !value.is_empty())
        };

        let id = field(Some(self.columns.id))?;
        let title = field(Some(self.columns.title))?;
        let year = match field(self.columns.start_year) {
            Some(raw) => raw.parse::<i32>().ok()?,
            None => 0,
        };

        let mut item = CatalogItem::new(id, title, year);
        if let Some(title_type) = field(self.columns.title_type) {
            item = item.with_attribute("title_type", title_type);
        }
        if let Some(original) = field(self.columns.original_title) {
            item = item.with_attribute("original_title", original);
        }
        if let Some(adult) = field(self.columns.is_adult) {
            let adult = match adult {
                "0" => false,
                "1" => true,
                _ => return None,
            };
            item = item.with_attribute("is_adult", adult);
        }
        if let Some(genres) = field(self.columns.genres) {
            let genres: Vec<&str> = genres.split(',').collect();
            item = item.with_attribute("genres", genres);
        }
        Some(item)
    }
}

impl<R: Read> Iterator for TsvFeed<R> {
    type Item = CatalogItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) if e.is_io_error() => {
                    self.error = Some(e);
                    return None;
                }
                Err(e) => {
                    self.failed += 1;
                    log::debug!("Skipping unreadable feed row: {}", e);
                    continue;
                }
            };

            match self.decode(&record) {
                Some(item) => {
                    self.read += 1;
                    return Some(item);
                }
                None => {
                    self.failed += 1;
                    log::debug!("Skipping undecodable feed row at {:?}", record.position());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short\n\
tt0000002\tmovie\tNo Year\tNo Year\t0\t\\N\t\\N\t\\N\t\\N\n\
tt0000003\tmovie\tBad Year\tBad Year\t0\tsoon\t\\N\t\\N\tDrama\n\
tt0000004\tmovie\t\\N\tUntitled\t0\t2000\t\\N\t\\N\tDrama\n\
tt0000005\ttvSeries\t\"Quoted\" Title\tOriginal\t1\t2020\t\\N\t30\tComedy\n";

    #[test]
    fn test_decodes_rows_and_counts_failures() {
        let mut feed = TsvFeed::from_reader(SAMPLE.as_bytes(), '\t').unwrap();
        let items: Vec<CatalogItem> = feed.by_ref().collect();

        assert_eq!(items.len(), 3);
        assert_eq!(feed.read(), 3);
        assert_eq!(feed.failed(), 2);

        let first = &items[0];
        assert_eq!(first.id, "tt0000001");
        assert_eq!(first.year, 1894);
        assert_eq!(first.attributes["title_type"], "short");
        assert_eq!(first.attributes["is_adult"], false);
        assert_eq!(first.attributes["genres"], serde_json::json!(["Documentary", "Short"]));
    }

    #[test]
    fn test_null_fields_are_omitted() {
        let items: Vec<CatalogItem> = TsvFeed::from_reader(SAMPLE.as_bytes(), '\t')
            .unwrap()
            .collect();

        let no_year = &items[1];
        assert_eq!(no_year.year, 0);
        assert!(!no_year.attributes.contains_key("genres"));
    }

    #[test]
    fn test_quotes_are_literal() {
        let items: Vec<CatalogItem> = TsvFeed::from_reader(SAMPLE.as_bytes(), '\t')
            .unwrap()
            .collect();

        assert_eq!(items[2].title, "\"Quoted\" Title");
        assert_eq!(items[2].attributes["is_adult"], true);
    }

    #[test]
    fn test_missing_required_column() {
        let err = TsvFeed::from_reader("id\ttitle\n1\tx\n".as_bytes(), '\t')
            .err()
            .unwrap();
        assert!(err.to_string().contains("tconst column missing"));
    }

    #[test]
    fn test_open_reads_gzip_and_reports_missing_file_as_io() {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("title.basics.tsv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let items: Vec<CatalogItem> = TsvFeed::open(&path, '\t').unwrap().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Carmencita");

        let err = TsvFeed::open(tmp.path().join("missing.tsv"), '\t').err().unwrap();
        assert!(matches!(err, AppError::Io(_)));
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk gone"))
        }
    }

    #[test]
    fn test_read_failure_stops_with_error() {
        let mut feed = TsvFeed::from_reader(SAMPLE.as_bytes().chain(Broken), '\t').unwrap();
        let items: Vec<CatalogItem> = feed.by_ref().collect();

        assert!(items.len() <= 3);
        let err = feed.take_error().unwrap();
        assert!(err.to_string().contains("disk gone"));
        assert!(feed.take_error().is_none());
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        assert!(TsvFeed::from_reader(SAMPLE.as_bytes(), '→').is_err());
    }
}
