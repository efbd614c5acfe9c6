//! Errors raised while reading or preparing a configuration repository.

use std::io;
use std::path::PathBuf;

/// A repository file that is missing, unreadable or malformed.
///
/// Checks turn these into failed outcomes; they never abort a run.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A file or directory could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A document is not well-formed XML.
    #[error("{document} is not well-formed XML: {source}")]
    Xml {
        /// Name of the document (usually the file name).
        document: String,
        /// The parser error, including line and column.
        #[source]
        source: roxmltree::Error,
    },

    /// An element the document shape requires is absent.
    #[error("<{element}> is missing from a <{parent}> element")]
    MissingElement {
        /// The missing element or attribute.
        element: &'static str,
        /// The element that should contain it.
        parent: &'static str,
    },

    /// The named IOC does not appear in the document.
    #[error("IOC {ioc} is not declared in this document")]
    IocNotFound {
        /// The IOC that was looked up.
        ioc: String,
    },

    /// A synoptic component declares a target without a type.
    #[error(
        "couldn't find ./type or ./target/name in component (name: {}, type: {}, target: {})",
        or_unknown(name),
        or_unknown(kind),
        or_unknown(target)
    )]
    IncompleteSynopticComponent {
        /// The component's `<name>`, if present.
        name: Option<String>,
        /// The component's `<type>`, if present.
        kind: Option<String>,
        /// The component's `<target><name>`, if present.
        target: Option<String>,
    },

    /// A version string has no numeric release components.
    #[error("cannot derive a release from version {version:?}")]
    InvalidVersion {
        /// The version string as read.
        version: String,
    },

    /// A repository could not be checked out at the requested ref.
    #[error("couldn't check out {reference} in {}", repo.display())]
    CheckoutFailed {
        /// Working copy that was being synchronized.
        repo: PathBuf,
        /// Branch or tag name.
        reference: String,
    },
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("could not be extracted")
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_component_message_names_every_part() {
        let err = ConfigError::IncompleteSynopticComponent {
            name: Some("Chopper".into()),
            kind: None,
            target: Some("Mk3 Chopper".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("name: Chopper"), "{msg}");
        assert!(msg.contains("type: could not be extracted"), "{msg}");
        assert!(msg.contains("target: Mk3 Chopper"), "{msg}");
    }
}
