//! Class label files.

use std::{borrow::Cow, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label file '{path}': {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Human-readable class names, indexed by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    /// Read one class name per line.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::ReadError`] if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LabelError::ReadError {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::from_lines(&contents))
    }

    /// Parse class names from text, one per line. Trailing blank lines are dropped.
    pub fn from_lines(contents: &str) -> Self {
        let mut names: Vec<String> = contents
            .lines()
            .map(|line| line.trim().to_string())
            .collect();
        while names.last().is_some_and(String::is_empty) {
            names.pop();
        }

        Self { names }
    }

    /// Name of class `index`, or `class_<index>` when the label set has no such entry.
    pub fn name(&self, index: usize) -> Cow<'_, str> {
        self.names.get(index).map_or_else(
            || Cow::Owned(format!("class_{index}")),
            |name| Cow::Borrowed(name.as_str()),
        )
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
