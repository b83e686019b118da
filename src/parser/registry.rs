//! Protocol tag to parser constructor mapping.

use std::collections::HashMap;

use super::{ProtocolParser, SmtpParser};
use crate::{
    error::{RegistryError, TaskError},
    protocol::Protocol,
};

/// Function creating a fresh parser in its initial state.
pub type ParserConstructor = fn() -> Box<dyn ProtocolParser>;

/// Registered parser constructors.
///
/// The [`Default`] registry knows SMTP only. [`HttpParser`](super::HttpParser)
/// exists but must be registered explicitly, so `Http` reports
/// [`TaskError::Unsupported`] unless a caller opts in.
///
/// # Examples
///
/// ```
/// use memerge::{HttpParser, ParserRegistry, Protocol, ProtocolParser};
///
/// fn http() -> Box<dyn ProtocolParser> { Box::new(HttpParser::new()) }
///
/// let registry = ParserRegistry::default()
///     .with(Protocol::Http, http)
///     .expect("http not yet registered");
/// assert!(registry.supports(Protocol::Http));
/// ```
#[derive(Clone, Debug)]
pub struct ParserRegistry {
    constructors: HashMap<Protocol, ParserConstructor>,
}

impl ParserRegistry {
    /// A registry with no parsers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `constructor` for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateParser`] if the protocol already has
    /// a constructor; the existing entry is kept.
    pub fn register(
        &mut self,
        protocol: Protocol,
        constructor: ParserConstructor,
    ) -> Result<(), RegistryError> {
        if self.constructors.contains_key(&protocol) {
            return Err(RegistryError::DuplicateParser(protocol));
        }
        self.constructors.insert(protocol, constructor);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateParser`] if the protocol already has
    /// a constructor.
    pub fn with(
        mut self,
        protocol: Protocol,
        constructor: ParserConstructor,
    ) -> Result<Self, RegistryError> {
        self.register(protocol, constructor)?;
        Ok(self)
    }

    /// Whether `protocol` has a constructor.
    #[must_use]
    pub fn supports(&self, protocol: Protocol) -> bool { self.constructors.contains_key(&protocol) }

    /// Create a parser for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unsupported`] when nothing is registered.
    pub fn create(&self, protocol: Protocol) -> Result<Box<dyn ProtocolParser>, TaskError> {
        self.constructors
            .get(&protocol)
            .map(|constructor| constructor())
            .ok_or(TaskError::Unsupported(protocol))
    }
}

fn smtp() -> Box<dyn ProtocolParser> { Box::new(SmtpParser::new()) }

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut constructors: HashMap<Protocol, ParserConstructor> = HashMap::new();
        constructors.insert(Protocol::Smtp, smtp);
        Self { constructors }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::parser::HttpParser;

    fn http() -> Box<dyn ProtocolParser> { Box::new(HttpParser::new()) }

    #[test]
    fn default_registry_supports_smtp_only() {
        let registry = ParserRegistry::default();

        assert!(registry.supports(Protocol::Smtp));
        assert!(!registry.supports(Protocol::Http));
        assert_eq!(
            registry.create(Protocol::Http).map(|_| ()),
            Err(TaskError::Unsupported(Protocol::Http))
        );
    }

    #[rstest]
    #[case(Protocol::Smtp)]
    #[case(Protocol::Http)]
    fn created_parser_reports_protocol(#[case] protocol: Protocol) {
        let registry = ParserRegistry::default()
            .with(Protocol::Http, http)
            .expect("register http");
        let parser = registry.create(protocol).expect("parser registered");
        assert_eq!(parser.protocol(), protocol);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ParserRegistry::default();
        assert_eq!(
            registry.register(Protocol::Smtp, http),
            Err(RegistryError::DuplicateParser(Protocol::Smtp))
        );
        let parser = registry.create(Protocol::Smtp).expect("smtp kept");
        assert_eq!(parser.protocol(), Protocol::Smtp);
    }

    #[test]
    fn empty_registry_supports_nothing() {
        let registry = ParserRegistry::empty();
        assert!(Protocol::ALL.iter().all(|&p| !registry.supports(p)));
    }
}
