//! Changeset references.
//!
//! Gerrit publishes every patchset under `refs/changes/<shard>/<number>/<patchset>`,
//! where `<shard>` is the last two digits of the change number. Users refer to
//! changesets by that ref, by a review URL, or by the bare number.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every changeset ref.
pub const REF_PREFIX: &str = "refs/changes/";

/// A change number with an optional patchset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReference {
    change_number: String,
    patchset: Option<u32>,
}

impl ChangeReference {
    /// Parse a ref path, a URL ending in a change number, or a bare number.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when the shard does not match the change
    /// number, the patchset is not a positive integer, or the change number
    /// is not purely decimal.
    pub fn parse(input: &str) -> Result<Self> {
        let (change_number, patchset) = if input.starts_with(REF_PREFIX) {
            parse_ref_path(input)?
        } else if input.contains('/') {
            let trimmed = input.trim_end_matches('/');
            let last = trimmed.rsplit('/').next().unwrap_or_default();
            (last, None)
        } else {
            (input, None)
        };

        if !is_decimal(change_number) {
            return Err(Error::invalid_format(
                input,
                format!("`{change_number}` is not a change number"),
            ));
        }

        Ok(Self {
            change_number: change_number.to_string(),
            patchset,
        })
    }

    /// Like [`ChangeReference::parse`], but also accepts `NNNN/PP`.
    ///
    /// # Errors
    ///
    /// As [`ChangeReference::parse`]; a zero patchset in the short form is
    /// rejected too.
    pub fn parse_target(input: &str) -> Result<Self> {
        if let Some((number, patchset)) = input.split_once('/') {
            if is_decimal(number) && is_decimal(patchset) {
                return Ok(Self {
                    change_number: number.to_string(),
                    patchset: Some(parse_patchset(input, patchset)?),
                });
            }
        }
        Self::parse(input)
    }

    /// Build a reference from parts already known to be valid.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] if `change_number` is not decimal or
    /// `patchset` is zero.
    pub fn new(change_number: &str, patchset: Option<u32>) -> Result<Self> {
        if !is_decimal(change_number) {
            return Err(Error::invalid_format(change_number, "not a change number"));
        }
        if patchset == Some(0) {
            return Err(Error::invalid_format(change_number, "patchsets start at 1"));
        }
        Ok(Self {
            change_number: change_number.to_string(),
            patchset,
        })
    }

    /// The change number, all digits.
    #[must_use]
    pub fn change_number(&self) -> &str {
        &self.change_number
    }

    /// The requested patchset, if any.
    #[must_use]
    pub const fn patchset(&self) -> Option<u32> {
        self.patchset
    }

    /// The two-character shard directory for this change.
    #[must_use]
    pub fn shard(&self) -> String {
        shard_for(&self.change_number)
    }

    /// The fetchable ref for `patchset` of this change.
    #[must_use]
    pub fn ref_name(&self, patchset: u32) -> String {
        format!(
            "{REF_PREFIX}{}/{}/{patchset}",
            self.shard(),
            self.change_number
        )
    }

    /// Pick the patchset to use given the server's current one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when the requested patchset does not exist yet.
    pub fn resolve_patchset(&self, current: u32) -> Result<u32> {
        match self.patchset {
            Some(requested) if requested > current => Err(Error::invalid_format(
                &self.to_string(),
                format!("patchset {requested} does not exist, latest is {current}"),
            )),
            Some(requested) => Ok(requested),
            None => Ok(current),
        }
    }
}

impl FromStr for ChangeReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ChangeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patchset {
            Some(patchset) => write!(f, "{}/{patchset}", self.change_number),
            None => f.write_str(&self.change_number),
        }
    }
}

fn parse_ref_path(input: &str) -> Result<(&str, Option<u32>)> {
    let segments: Vec<&str> = input.split('/').collect();
    let (shard, number, patchset) = match segments.as_slice() {
        [_, _, shard, number] => (*shard, *number, None),
        [_, _, shard, number, patchset] => (*shard, *number, Some(*patchset)),
        _ => {
            return Err(Error::invalid_format(
                input,
                "expected refs/changes/<shard>/<number>[/<patchset>]",
            ))
        }
    };

    if shard_for(number) != shard {
        return Err(Error::invalid_format(
            input,
            format!("shard `{shard}` does not match change number `{number}`"),
        ));
    }

    let patchset = match patchset {
        Some(raw) if !raw.is_empty() => Some(parse_patchset(input, raw)?),
        _ => None,
    };
    Ok((number, patchset))
}

fn parse_patchset(input: &str, raw: &str) -> Result<u32> {
    if !is_decimal(raw) {
        return Err(Error::invalid_format(
            input,
            format!("patchset `{raw}` is not a number"),
        ));
    }
    match raw.parse::<u32>() {
        Ok(0) => Err(Error::invalid_format(input, "patchsets start at 1")),
        Ok(patchset) => Ok(patchset),
        Err(err) => Err(Error::invalid_format(input, format!("patchset `{raw}`: {err}"))),
    }
}

// Single-digit changes live under a zero-padded shard (`refs/changes/05/5/1`).
fn shard_for(number: &str) -> String {
    let tail: Vec<char> = number.chars().rev().take(2).collect();
    match tail.as_slice() {
        [only] => format!("0{only}"),
        _ => tail.iter().rev().collect(),
    }
}

fn is_decimal(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}
