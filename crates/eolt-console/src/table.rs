//! Command tables and reading caches
//!
//! A [`CommandTable`] maps logical names to parameters; it is the contract
//! between test code and one product's firmware. Tables are built in code
//! or loaded from RON:
//!
//! ```ron
//! {
//!     "BATTERY_VOLTS": (verb: "X-BATTERY-VOLTS", kind: Float(scale: 1000.0), writeable: false),
//!     "FAN": (verb: "FAN", kind: Boolean),
//! }
//! ```

use crate::error::{ConsoleError, Result};
use crate::parameter::Parameter;
use std::collections::BTreeMap;

/// Logical name to parameter mapping for one product
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    params: BTreeMap<String, Parameter>,
}

impl CommandTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style
    pub fn with(mut self, name: &str, param: Parameter) -> Self {
        self.insert(name, param);
        self
    }

    /// Add or replace a parameter
    pub fn insert(&mut self, name: &str, param: Parameter) {
        self.params.insert(name.to_string(), param);
    }

    /// Load a table from RON
    ///
    /// Raw parameters cannot be expressed in RON and must be added in code.
    pub fn from_ron(content: &str) -> Result<Self> {
        let params: BTreeMap<String, Parameter> = ron::from_str(content)?;
        Ok(Self { params })
    }

    /// Look up a parameter
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// Look up a parameter or fail with `UnknownParameter`
    pub fn lookup(&self, name: &str) -> Result<&Parameter> {
        self.get(name)
            .ok_or_else(|| ConsoleError::UnknownParameter(name.to_string()))
    }

    /// Whether the table has `name`
    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Logical names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Name and parameter pairs, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.params.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// How a bulk reading command formats its lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `KEY=VALUE`
    KeyEquals,
    /// `KEY VALUE`
    KeySpace,
}

impl LineFormat {
    /// Split a line into key and value, `None` if it does not match
    pub fn parse<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let (key, value) = match self {
            LineFormat::KeyEquals => line.split_once('=')?,
            LineFormat::KeySpace => line.trim().split_once(char::is_whitespace)?,
        };
        let (key, value) = (key.trim(), value.trim());
        let valid_key = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        (valid_key && !value.is_empty()).then_some((key, value))
    }
}

/// Values captured from a bulk reading command such as `STAT` or `CAL?`
#[derive(Debug, Clone)]
pub struct ReadingCache {
    format: LineFormat,
    values: BTreeMap<String, String>,
}

impl ReadingCache {
    /// Create an empty cache for lines in `format`
    pub fn new(format: LineFormat) -> Self {
        Self {
            format,
            values: BTreeMap::new(),
        }
    }

    /// Drop all values
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Add every matching line; returns how many matched
    pub fn load<S: AsRef<str>>(&mut self, lines: &[S]) -> usize {
        let mut matched = 0;
        for line in lines {
            match self.format.parse(line.as_ref()) {
                Some((key, value)) => {
                    self.values.insert(key.to_string(), value.to_string());
                    matched += 1;
                }
                None => log::trace!("console: ignoring line {:?}", line.as_ref()),
            }
        }
        matched
    }

    /// Raw value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Numeric value of `key`
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Number of values held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Kind;

    #[test]
    fn test_from_ron() {
        let table = CommandTable::from_ron(
            r#"{
                "BATTERY_VOLTS": (verb: "X-BATTERY-VOLTS", kind: Float(scale: 1000.0), writeable: false),
                "FAN": (verb: "FAN", kind: Boolean),
                "STATUS": (verb: "STATUS", kind: Hex(mask: 0xFFFFFFFF, prefix: true), read_format: Some("{verb}")),
            }"#,
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        let volts = table.get("BATTERY_VOLTS").unwrap();
        assert!(!volts.writeable);
        assert!(matches!(volts.kind, Kind::Float { scale, .. } if scale == 1000.0));
        assert_eq!(table.lookup("STATUS").unwrap().read_command(), "STATUS");
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["BATTERY_VOLTS", "FAN", "STATUS"]);
        assert_eq!(
            table.iter().map(|(name, p)| (name, p.verb.as_str())).last(),
            Some(("STATUS", "STATUS"))
        );
        assert!(table.get("NOPE").is_none());
        assert!(matches!(
            table.lookup("NOPE"),
            Err(ConsoleError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_from_ron_error() {
        assert!(matches!(
            CommandTable::from_ron("{ \"X\": (kind: Boolean) }"),
            Err(ConsoleError::Table(_))
        ));
    }

    #[test]
    fn test_stat_cache() {
        let mut cache = ReadingCache::new(LineFormat::KeyEquals);
        let n = cache.load(&["VOUT=13800", "IOUT = 2500", "garbage line", "=5"]);
        assert_eq!(n, 2);
        assert_eq!(cache.get_f64("IOUT"), Some(2500.0));
        assert_eq!(cache.get("VOUT"), Some("13800"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cal_cache() {
        let mut cache = ReadingCache::new(LineFormat::KeySpace);
        cache.load(&["SET_VOLTS_MV_NUM   52000", "I_READ_NUM 1000", "lonely"]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_f64("SET_VOLTS_MV_NUM"), Some(52000.0));
    }
}
