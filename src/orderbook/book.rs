// Per-symbol order book used to decide whether a synthetic order would fill
//
// Updates are buffered per side and applied by `process`. Matching only looks
// at the top of the opposite side and never consumes resting quantity.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A single aggregated price level, as carried by the book channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub qty: f64,
}

impl PriceLevel {
    pub fn new(price: f64, qty: f64) -> Self {
        Self { price, qty }
    }
}

/// Wrapper for f64 to use as a map key
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Outcome of a crossing match. The price is always the taker's own limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
}

#[derive(Debug, Default)]
struct BookSides {
    bids: HashMap<OrderedFloat, f64>,
    asks: HashMap<OrderedFloat, f64>,
    /// Ascending price snapshots, rebuilt only when a level appears or disappears
    sorted_bids: Vec<f64>,
    sorted_asks: Vec<f64>,
    bids_dirty: bool,
    asks_dirty: bool,
}

impl BookSides {
    fn rebuild_bids(&mut self) {
        self.sorted_bids = sorted_prices(&self.bids);
        self.bids_dirty = false;
    }

    fn rebuild_asks(&mut self) {
        self.sorted_asks = sorted_prices(&self.asks);
        self.asks_dirty = false;
    }

    fn match_bid(&self, price: f64, qty: f64) -> Option<Fill> {
        let lowest_ask = *self.sorted_asks.first()?;
        if lowest_ask > price {
            return None;
        }
        let resting = self.asks.get(&OrderedFloat(lowest_ask)).copied()?;
        fill_at(price, resting.min(qty))
    }

    fn match_ask(&self, price: f64, qty: f64) -> Option<Fill> {
        let highest_bid = *self.sorted_bids.last()?;
        if highest_bid < price {
            return None;
        }
        let resting = self.bids.get(&OrderedFloat(highest_bid)).copied()?;
        fill_at(price, resting.min(qty))
    }
}

fn sorted_prices(levels: &HashMap<OrderedFloat, f64>) -> Vec<f64> {
    let mut prices: Vec<f64> = levels.keys().map(|key| key.0).collect();
    prices.sort_by(|a, b| a.total_cmp(b));
    prices
}

fn fill_at(price: f64, qty: f64) -> Option<Fill> {
    if qty > 0.0 {
        Some(Fill { price, qty })
    } else {
        None
    }
}

/// Apply one level; returns true when a price level was added or removed
fn apply_level(levels: &mut HashMap<OrderedFloat, f64>, level: PriceLevel) -> bool {
    let key = OrderedFloat(level.price);
    if level.qty == 0.0 {
        levels.remove(&key).is_some()
    } else {
        levels.insert(key, level.qty).is_none()
    }
}

/// Approximate top-of-book view for one symbol
#[derive(Debug)]
pub struct Orderbook {
    symbol: String,
    sides: RwLock<BookSides>,
    incoming_bids: Mutex<Vec<PriceLevel>>,
    incoming_asks: Mutex<Vec<PriceLevel>>,
}

impl Orderbook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sides: RwLock::new(BookSides::default()),
            incoming_bids: Mutex::new(Vec::new()),
            incoming_asks: Mutex::new(Vec::new()),
        }
    }

    /// Buffer bid levels until the next `process`
    pub fn add_bids(&self, bids: &[PriceLevel]) {
        lock(&self.incoming_bids).extend_from_slice(bids);
    }

    /// Buffer ask levels until the next `process`
    pub fn add_asks(&self, asks: &[PriceLevel]) {
        lock(&self.incoming_asks).extend_from_slice(asks);
    }

    /// Drain buffered levels into the book
    pub fn process(&self) {
        let bids: Vec<PriceLevel> = std::mem::take(&mut *lock(&self.incoming_bids));
        let asks: Vec<PriceLevel> = std::mem::take(&mut *lock(&self.incoming_asks));
        if bids.is_empty() && asks.is_empty() {
            return;
        }

        let mut sides = self.write();
        for bid in bids {
            if apply_level(&mut sides.bids, bid) {
                sides.bids_dirty = true;
            }
        }
        for ask in asks {
            if apply_level(&mut sides.asks, ask) {
                sides.asks_dirty = true;
            }
        }
        debug!(
            "Book {} now {} bids / {} asks",
            self.symbol,
            sides.bids.len(),
            sides.asks.len()
        );
    }

    /// Would a buy at `price` cross the lowest ask, and for how much
    pub fn match_bid(&self, price: f64, qty: f64) -> Option<Fill> {
        {
            let sides = self.read();
            if !sides.asks_dirty {
                return sides.match_bid(price, qty);
            }
        }
        let mut sides = self.write();
        if sides.asks_dirty {
            sides.rebuild_asks();
        }
        sides.match_bid(price, qty)
    }

    /// Would a sell at `price` cross the highest bid, and for how much
    pub fn match_ask(&self, price: f64, qty: f64) -> Option<Fill> {
        {
            let sides = self.read();
            if !sides.bids_dirty {
                return sides.match_ask(price, qty);
            }
        }
        let mut sides = self.write();
        if sides.bids_dirty {
            sides.rebuild_bids();
        }
        sides.match_ask(price, qty)
    }

    /// Highest resting bid, if any
    pub fn best_bid(&self) -> Option<PriceLevel> {
        let sides = self.read();
        sides
            .bids
            .iter()
            .max_by_key(|(price, _)| **price)
            .map(|(price, qty)| PriceLevel::new(price.0, *qty))
    }

    /// Lowest resting ask, if any
    pub fn best_ask(&self) -> Option<PriceLevel> {
        let sides = self.read();
        sides
            .asks
            .iter()
            .min_by_key(|(price, _)| **price)
            .map(|(price, qty)| PriceLevel::new(price.0, *qty))
    }

    /// Number of (bid, ask) price levels
    pub fn depth(&self) -> (usize, usize) {
        let sides = self.read();
        (sides.bids.len(), sides.asks.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, BookSides> {
        self.sides.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BookSides> {
        self.sides.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// Book contents stay consistent across a panicking holder: every mutation is a
// single map insert/remove.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
