//! Yearly regulator archives.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{DataError, DataResult};
use crate::models::StatementType;
use crate::utils::{parse_table, RawTable, ReadCandidate, TextEncoding};

/// Archive members are always semicolon-delimited ISO-8859-1
pub const ARCHIVE_MEMBER_FORMAT: ReadCandidate = ReadCandidate::new(b';', TextEncoding::Latin1);

/// Report scope of a sub-table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportScope {
    Consolidated,
    Individual,
}

impl ReportScope {
    fn suffix(&self) -> &'static str {
        match self {
            ReportScope::Consolidated => "con",
            ReportScope::Individual => "ind",
        }
    }
}

/// The two sub-tables of one (statement type, year); either may be absent
#[derive(Debug, Clone, Default)]
pub struct YearTables {
    pub consolidated: Option<RawTable>,
    pub individual: Option<RawTable>,
}

impl YearTables {
    pub fn is_empty(&self) -> bool {
        self.consolidated.as_ref().map_or(true, RawTable::is_empty)
            && self.individual.as_ref().map_or(true, RawTable::is_empty)
    }
}

/// Where yearly sub-tables come from
pub trait YearlySource {
    /// `Ok(None)` when nothing exists for the year; `Err` when it exists but cannot be read
    fn load_year(&self, statement_type: StatementType, year: i32) -> DataResult<Option<YearTables>>;
}

pub fn archive_file_name(year: i32) -> String {
    format!("dfp_cia_aberta_{}.zip", year)
}

pub fn member_file_name(statement_type: StatementType, scope: ReportScope, year: i32) -> String {
    format!(
        "dfp_cia_aberta_{}_{}_{}.csv",
        statement_type.code(),
        scope.suffix(),
        year
    )
}

/// Directory of `dfp_cia_aberta_<year>.zip` files
#[derive(Debug, Clone)]
pub struct ZipArchiveSource {
    dir: PathBuf,
}

impl ZipArchiveSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn archive_path(&self, year: i32) -> PathBuf {
        self.dir.join(archive_file_name(year))
    }

    fn read_member(
        archive: &mut ZipArchive<File>,
        name: &str,
        archive_path: &Path,
    ) -> DataResult<Option<RawTable>> {
        let mut member = match archive.by_name(name) {
            Ok(member) => member,
            Err(ZipError::FileNotFound) => {
                debug!("{} has no member {}", archive_path.display(), name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes)?;

        parse_table(&bytes, ARCHIVE_MEMBER_FORMAT)
            .map(Some)
            .ok_or_else(|| DataError::malformed(archive_path.join(name), "member is not valid CSV"))
    }
}

impl YearlySource for ZipArchiveSource {
    fn load_year(&self, statement_type: StatementType, year: i32) -> DataResult<Option<YearTables>> {
        let path = self.archive_path(year);
        if !path.exists() {
            return Ok(None);
        }

        let mut archive = ZipArchive::new(File::open(&path)?)?;

        let consolidated = Self::read_member(
            &mut archive,
            &member_file_name(statement_type, ReportScope::Consolidated, year),
            &path,
        )?;
        let individual = Self::read_member(
            &mut archive,
            &member_file_name(statement_type, ReportScope::Individual, year),
            &path,
        )?;

        Ok(Some(YearTables { consolidated, individual }))
    }
}

/// In-memory source keyed by (type, year); used by tests and callers that already hold the tables
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    years: HashMap<(StatementType, i32), YearTables>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, statement_type: StatementType, year: i32, tables: YearTables) {
        self.years.insert((statement_type, year), tables);
    }
}

impl YearlySource for MemorySource {
    fn load_year(&self, statement_type: StatementType, year: i32) -> DataResult<Option<YearTables>> {
        Ok(self.years.get(&(statement_type, year)).cloned())
    }
}
