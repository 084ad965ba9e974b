//! Class label tables.

use std::{fmt, path::Path, str::FromStr, sync::Arc};

use anyhow::Context;

/// Labels used when no label file is available.
pub const DEFAULT_LABELS: [&str; 10] = [
    "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine",
];

/// What to do when the label file cannot be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Fail startup.
    Strict,
    /// Log a warning and use [`DEFAULT_LABELS`].
    #[default]
    Lenient,
}

impl FromStr for LabelPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => anyhow::bail!(
                "invalid label policy '{}' (expected 'strict' or 'lenient')",
                s
            ),
        }
    }
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        })
    }
}

/// An ordered, immutable list of class labels.
///
/// Index `i` names the class the classifier reports as label index `i`. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Arc<[String]>,
}

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads labels from a CSV file.
    ///
    /// Under [`LabelPolicy::Lenient`], a file that cannot be read or parsed results in the default
    /// table instead of an error.
    pub fn load<P: AsRef<Path>>(path: P, policy: LabelPolicy) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let result = std::fs::read(path)
            .with_context(|| format!("failed to read label file '{}'", path.display()))
            .and_then(|data| {
                Self::parse(&data)
                    .with_context(|| format!("failed to parse label file '{}'", path.display()))
            });

        match (result, policy) {
            (Ok(table), _) => {
                log::info!("loaded {} labels from '{}'", table.len(), path.display());
                Ok(table)
            }
            (Err(e), LabelPolicy::Strict) => Err(e),
            (Err(e), LabelPolicy::Lenient) => {
                log::warn!("{:#}; using default labels", e);
                Ok(Self::default())
            }
        }
    }

    /// Parses the contents of a label CSV file.
    ///
    /// The file has no header row. The first field of every record is a label; further fields
    /// are ignored. Fields may be quoted, and blank lines and a leading byte order mark are
    /// skipped. Returns an error if the data is not valid UTF-8 CSV.
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let data = data.strip_prefix(b"\xef\xbb\xbf").unwrap_or(data);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut labels = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("malformed label record #{}", i))?;
            labels.push(record.get(0).unwrap_or_default().to_string());
        }
        Ok(Self::new(labels))
    }

    /// Returns the label for class `index`, if there is one.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.labels.iter().map(String::as_str)
    }
}

impl Default for LabelTable {
    /// Returns the table of [`DEFAULT_LABELS`].
    fn default() -> Self {
        Self::new(DEFAULT_LABELS)
    }
}
