//! Minimal reader for the `key=value` recipe format.
//!
//! `[section]` headers, `#`/`;` comment lines, blank lines, and one pair of
//! surrounding double quotes on values. Keys outside any section are ignored.
//! Lines without `=` are skipped.

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct IniDoc {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDoc {
    pub fn parse(text: &str) -> Self {
        let mut doc = IniDoc::default();
        let mut section: Option<String> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name.trim().to_string());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some(sec) = section.as_ref() else {
                continue;
            };
            doc.sections
                .entry(sec.clone())
                .or_default()
                .insert(key.trim().to_string(), unquote(value.trim()).to_string());
        }

        doc
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    /// Value with surrounding whitespace removed; empty values read as absent.
    pub fn non_empty(&self, section: &str, key: &str) -> Option<String> {
        self.get(section, key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn string(&self, section: &str, key: &str) -> String {
        self.get(section, key).unwrap_or_default().to_string()
    }
}

fn unquote(v: &str) -> &str {
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        &v[1..v.len() - 1]
    } else {
        v
    }
}
