//! Contestant definitions
//!
//! One person's entry in the draw.

use chrono::NaiveDate;

use crate::error::{DrawError, Result};

/// ISO calendar date format used on the wire
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format used in the result store
pub const STORE_DATE_FORMAT: &str = "%d/%m/%Y";

/// An immutable contestant record
///
/// Identity is the full 4-tuple; two contestants with the same fields are
/// the same entry as far as the draw is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contestant {
    first_name: String,
    last_name: String,
    document: String,
    birth_date: NaiveDate,
}

impl Contestant {
    /// Create a contestant from an already-parsed birth date
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birth_date,
        }
    }

    /// Create a contestant, parsing `birth_date` as `YYYY-MM-DD`
    pub fn parse(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birth_date: &str,
    ) -> Result<Self> {
        let birth_date = NaiveDate::parse_from_str(birth_date.trim(), ISO_DATE_FORMAT)
            .map_err(|e| {
                DrawError::Application(format!("invalid birth date {:?}: {}", birth_date, e))
            })?;
        Ok(Self::new(first_name, last_name, document, birth_date))
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    /// Birth date as it travels on the wire (`YYYY-MM-DD`)
    pub fn birth_date_iso(&self) -> String {
        self.birth_date.format(ISO_DATE_FORMAT).to_string()
    }

    /// The line persisted for this contestant once it has won, newline included
    pub fn result_line(&self) -> String {
        format!(
            "Full name: {} {} | Document: {} | Date of Birth: {}\n",
            self.first_name,
            self.last_name,
            self.document,
            self.birth_date.format(STORE_DATE_FORMAT)
        )
    }
}
