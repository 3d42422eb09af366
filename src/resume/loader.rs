//! Code loading for lazy closures.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::heap::Value;

use super::Container;

/// A loaded closure body: called with the container, its captures, and the call arguments.
pub type QrlFn = Rc<dyn Fn(&mut Container, &[Value], &[Value]) -> anyhow::Result<Value>>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Chunk {0} could not be found")]
    ChunkNotFound(String),

    #[error("Symbol {symbol} is not exported by chunk {chunk}")]
    SymbolNotFound { chunk: String, symbol: String },
}

/// Resolves `(chunk, symbol)` pairs to callable code.
pub trait ChunkLoader {
    fn load(&mut self, chunk: &str, symbol: &str) -> Result<QrlFn, LoadError>;
}

/// In-memory loader for development and tests. Counts every load it serves.
#[derive(Default)]
pub struct SymbolRegistry {
    symbols: HashMap<String, HashMap<String, QrlFn>>,
    loads: Rc<Cell<usize>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, chunk: &str, symbol: &str, body: F) -> &mut Self
    where
        F: Fn(&mut Container, &[Value], &[Value]) -> anyhow::Result<Value> + 'static,
    {
        self.symbols
            .entry(chunk.to_string())
            .or_default()
            .insert(symbol.to_string(), Rc::new(body));
        self
    }

    /// Shared load counter; stays readable after the registry moves into a container.
    pub fn load_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.loads)
    }
}

impl ChunkLoader for SymbolRegistry {
    fn load(&mut self, chunk: &str, symbol: &str) -> Result<QrlFn, LoadError> {
        let exports = self
            .symbols
            .get(chunk)
            .ok_or_else(|| LoadError::ChunkNotFound(chunk.to_string()))?;
        let body = exports
            .get(symbol)
            .ok_or_else(|| LoadError::SymbolNotFound {
                chunk: chunk.to_string(),
                symbol: symbol.to_string(),
            })?;
        self.loads.set(self.loads.get() + 1);
        tracing::debug!(chunk, symbol, "Loaded symbol");
        Ok(Rc::clone(body))
    }
}
