//! Format strategy registry
//!
//! Holds the pluggable format strategies in registration order and picks the best one for a
//! document by confidence score. The registry is an ordinary value: build one (usually with
//! [`FormatRegistry::with_defaults`]) and hand it to consumers behind an `Arc`.

use crate::style_dictionary::StyleDictionaryStrategy;
use crate::types::FormatStrategy;
use crate::w3c::W3cStrategy;
use serde_json::Value;
use std::sync::Arc;
use tokenflow_common::{Result, TokenflowError};
use tracing::debug;

/// Outcome of format detection
#[derive(Clone)]
pub struct DetectedFormat {
    pub strategy: Arc<dyn FormatStrategy>,
    pub confidence: f64,
}

impl std::fmt::Debug for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectedFormat")
            .field("strategy", &self.strategy.name())
            .field("confidence", &self.confidence)
            .finish()
    }
}

#[derive(Default)]
pub struct FormatRegistry {
    strategies: Vec<Arc<dyn FormatStrategy>>,
}

impl FormatRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Registry with the built-in strategies, W3C first
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.strategies.push(Arc::new(W3cStrategy));
        registry.strategies.push(Arc::new(StyleDictionaryStrategy));
        registry
    }

    /// Register a strategy under its declared name.
    ///
    /// Fails if the name is taken; call [`clear`](Self::clear) first to re-register.
    pub fn register<S: FormatStrategy + 'static>(&mut self, strategy: S) -> Result<()> {
        self.register_arc(Arc::new(strategy))
    }

    pub fn register_arc(&mut self, strategy: Arc<dyn FormatStrategy>) -> Result<()> {
        if self.has(strategy.name()) {
            return Err(TokenflowError::DuplicateStrategy(strategy.name().to_string()));
        }
        debug!("Registered format strategy: {}", strategy.name());
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FormatStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.strategies.iter().any(|s| s.name() == name)
    }

    /// Names in registration order
    pub fn list(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.strategies.len()
    }

    pub fn clear(&mut self) {
        self.strategies.clear();
    }

    /// Every strategy's confidence for `document`, in registration order
    pub fn scores(&self, document: &Value) -> Vec<(String, f64)> {
        self.strategies
            .iter()
            .map(|s| (s.name().to_string(), s.detect(document)))
            .collect()
    }

    /// Strategy with the strictly highest score; ties go to the first registered.
    /// Returns `None` when nothing scores above zero.
    pub fn detect_format(&self, document: &Value) -> Option<DetectedFormat> {
        let mut best: Option<DetectedFormat> = None;

        for strategy in &self.strategies {
            let confidence = strategy.detect(document);
            debug!("Format {} scored {:.3}", strategy.name(), confidence);
            let better = match &best {
                Some(current) => confidence > current.confidence,
                None => confidence > 0.0,
            };
            if better {
                best = Some(DetectedFormat {
                    strategy: strategy.clone(),
                    confidence,
                });
            }
        }

        best
    }
}
