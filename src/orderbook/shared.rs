// Registry of order books shared by every proxied connection

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::orderbook::book::Orderbook;

/// One book per configured symbol. The symbol set is fixed at construction,
/// so lookups need no locking; each book carries its own lock.
#[derive(Debug, Default)]
pub struct SharedOrderbook {
    books: HashMap<String, Arc<Orderbook>>,
}

impl SharedOrderbook {
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        let books: HashMap<String, Arc<Orderbook>> = symbols
            .iter()
            .map(|symbol| {
                let symbol = symbol.as_ref().to_string();
                (symbol.clone(), Arc::new(Orderbook::new(symbol)))
            })
            .collect();

        info!("Tracking order books for {} symbol(s)", books.len());
        Self { books }
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<Orderbook>> {
        self.books.get(symbol).cloned()
    }

    /// Drain buffered updates of every book
    pub fn process_all(&self) {
        for book in self.books.values() {
            book.process();
        }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.books.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}
