//! Parsing, remapping, and formatting of `Name <email> <date>` attribution lines.
//!

use std::fmt::{self, Display, Formatter};

use chrono_tz::Tz;

use crate::date::Date;
use crate::error::AttributionError;

/// A named, timestamped identity: a commit's author or committer, or a tag's tagger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribution {
    pub fullname: String,
    pub email: String,
    pub date: Date,
}

impl Attribution {
    /// Parses `Name <email> <date>`, `Name<email>date`, or `Name <> date`.
    pub fn parse(s: &str) -> Result<Attribution, AttributionError> {
        let s = s.trim_end_matches(['\n', '\r']);
        let open = s.find('<').ok_or_else(|| malformed(s))?;
        let close = s[open..].find('>').map(|i| i + open).ok_or_else(|| malformed(s))?;
        let fullname = s[..open].trim().to_string();
        let email = s[open + 1..close].to_string();
        let date_str = s[close + 1..].trim();
        let date = Date::parse(date_str)?;
        Ok(Attribution { fullname, email, date })
    }

    pub fn address(&self) -> (&str, &str) {
        (&self.fullname, &self.email)
    }

    /// Looks up this attribution's canonical identity in `authormap` by local-alias equal
    /// to the email field, falling back to `(fullname, email)` in `aliasmap`. When the
    /// resolved record names a timezone, the date's offset is recomputed against that zone
    /// at the same instant.
    pub fn remap(&self, authormap: &AuthorMap) -> Attribution {
        let resolved = authormap
            .get_local(&self.email)
            .or_else(|| authormap.by_alias.get(&(self.fullname.clone(), self.email.clone())));
        match resolved {
            Some(contributor) => {
                let date = match &contributor.timezone {
                    Some(tz) => self.date.with_zone(*tz),
                    None => self.date,
                };
                Attribution { fullname: contributor.fullname.clone(), email: contributor.email.clone(), date }
            }
            None => self.clone(),
        }
    }
}

impl Display for Attribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.fullname, self.email, self.date.to_dump())
    }
}

fn malformed(s: &str) -> AttributionError {
    AttributionError::Malformed(s.as_bytes().to_vec())
}

/// A canonical identity a local alias resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contributor {
    pub fullname: String,
    pub email: String,
    pub timezone: Option<Tz>,
}

/// The author map: local-alias -> canonical contributor, plus a fallback keyed by the
/// original (fullname, email) pair for attributions that don't match by email alone.
#[derive(Clone, Debug, Default)]
pub struct AuthorMap {
    by_local: std::collections::HashMap<String, Contributor>,
    by_alias: std::collections::HashMap<(String, String), Contributor>,
}

impl AuthorMap {
    pub fn new() -> Self {
        AuthorMap::default()
    }

    pub fn insert_local(&mut self, local: impl Into<String>, contributor: Contributor) {
        self.by_local.insert(local.into().to_lowercase(), contributor);
    }

    pub fn insert_alias(&mut self, fullname: impl Into<String>, email: impl Into<String>, contributor: Contributor) {
        self.by_alias.insert((fullname.into(), email.into()), contributor);
    }

    pub fn get_local(&self, local: &str) -> Option<&Contributor> {
        self.by_local.get(&local.to_lowercase())
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, &Contributor)> {
        self.by_local.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&(String, String), &Contributor)> {
        self.by_alias.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_form() {
        let a = Attribution::parse("Eric S. Raymond <esr@thyrsus.com> 1322671432 +0000").unwrap();
        assert_eq!(a.fullname, "Eric S. Raymond");
        assert_eq!(a.email, "esr@thyrsus.com");
        assert_eq!(a.date.to_dump(), "1322671432 +0000");
    }

    #[test]
    fn parses_empty_email() {
        let a = Attribution::parse("Nobody <> 1322671432 +0000").unwrap();
        assert_eq!(a.email, "");
    }

    #[test]
    fn rejects_missing_angle_brackets() {
        assert!(Attribution::parse("not an attribution").is_err());
    }

    #[test]
    fn remaps_by_local_alias() {
        let mut map = AuthorMap::new();
        map.insert_local(
            "esr",
            Contributor { fullname: "Eric S. Raymond".into(), email: "esr@thyrsus.com".into(), timezone: None },
        );
        let a = Attribution::parse("esr <esr> 1322671432 +0000").unwrap();
        let remapped = a.remap(&map);
        assert_eq!(remapped.fullname, "Eric S. Raymond");
        assert_eq!(remapped.email, "esr@thyrsus.com");
    }

    #[test]
    fn remap_is_noop_without_match() {
        let map = AuthorMap::new();
        let a = Attribution::parse("Jane Doe <jane@example.com> 1322671432 +0000").unwrap();
        assert_eq!(a.remap(&map), a);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let a = Attribution::parse("Jane Doe <jane@example.com> 1322671432 +0000").unwrap();
        assert_eq!(Attribution::parse(&a.to_string()).unwrap(), a);
    }
}
