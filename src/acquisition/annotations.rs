// src/acquisition/annotations.rs
//! In-session annotation log

use serde::{Deserialize, Serialize};

/// User annotation keyed to the stream sample counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Sample index at the time the annotation was made
    pub timestamp: u64,
    pub text: String,
}

/// Append-only, ordered annotation sequence
#[derive(Debug, Clone, Default)]
pub struct AnnotationLog {
    entries: Vec<Annotation>,
}

impl AnnotationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: u64, text: impl Into<String>) {
        self.entries.push(Annotation {
            timestamp,
            text: text.into(),
        });
    }

    /// Entries in append order
    pub fn entries(&self) -> &[Annotation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_order_and_clear() {
        let mut log = AnnotationLog::new();
        log.push(120, "eyes closed");
        log.push(80, "blink");

        let texts: Vec<_> = log.entries().iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["eyes closed", "blink"]);
        assert_eq!(log.entries()[1].timestamp, 80);

        log.clear();
        assert!(log.is_empty());
    }
}
