use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The conventional jar entry name of the manifest.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// The attribute that leads every written manifest.
pub const MANIFEST_VERSION: &str = "Manifest-Version";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid UTF-8")]
    Encoding,
    #[error("malformed manifest line: {0}")]
    MalformedLine(String),
}

/// The main attributes of a jar manifest. Per-entry sections are not
/// interpreted; the engine only needs to propagate and inspect the main
/// section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    main_attributes: BTreeMap<String, String>,
}

impl Manifest {
    /// Creates a manifest that only declares `Manifest-Version: 1.0`.
    pub fn new() -> Manifest {
        let mut manifest = Manifest::default();
        manifest.set_main_attribute(MANIFEST_VERSION, "1.0");
        manifest
    }

    /// Parses the main attribute section of a manifest. Continuation lines
    /// (a leading space) append to the previous attribute's value; the main
    /// section ends at the first blank line.
    pub fn parse(bytes: &[u8]) -> Result<Manifest, ManifestError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ManifestError::Encoding)?;
        let mut main_attributes: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;
        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                let key = current
                    .as_ref()
                    .ok_or_else(|| ManifestError::MalformedLine(line.to_string()))?;
                if let Some(value) = main_attributes.get_mut(key) {
                    value.push_str(continuation);
                }
                continue;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| ManifestError::MalformedLine(line.to_string()))?;
            main_attributes.insert(key.to_string(), value.to_string());
            current = Some(key.to_string());
        }
        Ok(Manifest { main_attributes })
    }

    pub fn main_attribute(&self, key: &str) -> Option<&str> {
        self.main_attributes.get(key).map(String::as_str)
    }

    pub fn set_main_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.main_attributes.insert(key.into(), value.into());
    }

    pub fn main_attributes(&self) -> &BTreeMap<String, String> {
        &self.main_attributes
    }

    /// Serializes the main attribute section with CRLF line endings. The
    /// version attribute is always written first, as jar tooling expects.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = String::new();
        if let Some(version) = self.main_attributes.get(MANIFEST_VERSION) {
            write_attribute(&mut text, MANIFEST_VERSION, version);
        }
        for (key, value) in &self.main_attributes {
            if key != MANIFEST_VERSION {
                write_attribute(&mut text, key, value);
            }
        }
        text.push_str("\r\n");
        text.into_bytes()
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.main_attributes {
            writeln!(formatter, "{key}: {value}")?;
        }
        Ok(())
    }
}

fn write_attribute(text: &mut String, key: &str, value: &str) {
    text.push_str(key);
    text.push_str(": ");
    text.push_str(value);
    text.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_main_attributes() {
        let mut manifest = Manifest::new();
        manifest.set_main_attribute("Created-By", "weave");
        let parsed = Manifest::parse(&manifest.to_bytes()).expect("parse");
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.main_attribute(MANIFEST_VERSION), Some("1.0"));
    }

    #[test]
    fn joins_continuation_lines() {
        let manifest =
            Manifest::parse(b"Manifest-Version: 1.0\r\nMain-Class: com.exa\r\n mple.Main\r\n\r\n")
                .expect("parse");
        assert_eq!(
            manifest.main_attribute("Main-Class"),
            Some("com.example.Main")
        );
    }

    #[test]
    fn stops_at_the_first_blank_line() {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\n\r\nName: section\r\nSealed: true\r\n",
        )
        .expect("parse");
        assert_eq!(manifest.main_attribute("Name"), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(matches!(
            Manifest::parse(b"NoColonHere\r\n"),
            Err(ManifestError::MalformedLine(_))
        ));
    }
}
