//! `|`-delimited text fields of a response payload

use std::fmt;
use std::ops::Index;

use crate::error::{Error, Result};

/// Field delimiter
pub const DELIMITER: char = '|';

/// Text fields carried in a response payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(Vec<String>);

impl Fields {
    /// Split a payload into fields
    ///
    /// An empty payload has no fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use sepay_types::Fields;
    ///
    /// let fields = Fields::parse(b"0|APPROVED|AAA-123").unwrap();
    /// assert_eq!(fields.len(), 3);
    /// assert_eq!(fields.get(1), Some("APPROVED"));
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::Parse(format!("payload is not UTF-8: {}", e)))?;

        if text.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self(text.split(DELIMITER).map(str::to_owned).collect()))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Index<usize> for Fields {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}
