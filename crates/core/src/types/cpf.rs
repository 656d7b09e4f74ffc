//! Brazilian individual tax id (CPF).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Cpf`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CpfError {
    /// The input is empty or contains only whitespace.
    #[error("CPF cannot be empty")]
    Empty,
    /// The input does not contain exactly 11 digits.
    #[error("CPF must have exactly 11 digits (got {found})")]
    WrongDigitCount {
        /// Number of digits found after stripping punctuation.
        found: usize,
    },
}

/// A CPF, stored as its 11 digits without punctuation.
///
/// Only the digit count is checked: every non-digit character is stripped
/// and exactly 11 digits must remain. Check digits are not verified.
///
/// ```
/// use ingresso_core::Cpf;
///
/// let cpf = Cpf::parse("123.456.789-09").unwrap();
/// assert_eq!(cpf.as_str(), "12345678909");
/// assert!(Cpf::parse("123.456.789").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);

impl Cpf {
    /// Number of digits in a CPF.
    pub const DIGITS: usize = 11;

    /// Parse a CPF from user input, ignoring punctuation.
    ///
    /// # Errors
    ///
    /// Returns [`CpfError::Empty`] for blank input and
    /// [`CpfError::WrongDigitCount`] when the digit count is not 11.
    pub fn parse(s: &str) -> Result<Self, CpfError> {
        if s.trim().is_empty() {
            return Err(CpfError::Empty);
        }

        let digits: String = s.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != Self::DIGITS {
            return Err(CpfError::WrongDigitCount {
                found: digits.len(),
            });
        }

        Ok(Self(digits))
    }

    /// Returns the bare digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Formats as `000.000.000-00`.
    #[must_use]
    pub fn formatted(&self) -> String {
        let d = &self.0;
        match (d.get(0..3), d.get(3..6), d.get(6..9), d.get(9..11)) {
            (Some(a), Some(b), Some(c), Some(e)) => format!("{a}.{b}.{c}-{e}"),
            _ => d.clone(),
        }
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl TryFrom<String> for Cpf {
    type Error = CpfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cpf> for String {
    fn from(cpf: Cpf) -> Self {
        cpf.0
    }
}
