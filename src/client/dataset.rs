//! Dataset reader
//!
//! One contestant per line: `first,last,document,YYYY-MM-DD`.
//! Blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::contest::Contestant;
use crate::error::{DrawError, Result};

/// Parse one dataset line; `line_no` is 1-based and only used in errors
pub fn parse_line(line: &str, line_no: usize) -> Result<Contestant> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    match fields.as_slice() {
        [first_name, last_name, document, birth_date] => {
            Contestant::parse(*first_name, *last_name, *document, birth_date).map_err(|e| {
                DrawError::Application(format!("dataset line {}: {}", line_no, e))
            })
        }
        _ => Err(DrawError::Application(format!(
            "dataset line {}: expected 4 fields, found {}",
            line_no,
            fields.len()
        ))),
    }
}

/// Read a whole dataset file
pub fn read_dataset(path: &Path) -> Result<Vec<Contestant>> {
    let reader = BufReader::new(File::open(path)?);
    let mut contestants = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        contestants.push(parse_line(&line, index + 1)?);
    }
    Ok(contestants)
}
