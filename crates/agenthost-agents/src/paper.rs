use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use agenthost_models::{Instrument, Position, Side, Tick};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::Broker;
use crate::error::BrokerError;

/// Simulated broker.
///
/// Buys fill at the latest ask and sells at the latest bid, each moved
/// against the trader by `slippage_bps`. Quotes are fed in by the host via
/// `update_quote`. Agents trade through a `ScopedBroker` obtained from
/// `scoped`, which tags and filters positions by owner.
pub struct PaperBroker {
    book: Mutex<Book>,
    slippage_bps: f64,
}

#[derive(Default)]
struct Book {
    quotes: HashMap<String, Quote>,
    positions: Vec<Position>,
    realized_pnl: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    bid: f64,
    ask: f64,
}

impl PaperBroker {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperBroker initialized");
        Self {
            book: Mutex::new(Book::default()),
            slippage_bps,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Book>, BrokerError> {
        self.book
            .lock()
            .map_err(|e| BrokerError::Unavailable(format!("paper book poisoned: {e}")))
    }

    pub fn update_quote(&self, tick: &Tick) {
        if let Ok(mut book) = self.lock() {
            book.quotes.insert(
                tick.pair.clone(),
                Quote {
                    bid: tick.bid,
                    ask: tick.ask,
                },
            );
        }
    }

    /// A broker handle whose positions belong to `owner`.
    pub fn scoped(self: &Arc<Self>, owner: &str) -> ScopedBroker {
        ScopedBroker {
            inner: Arc::clone(self),
            owner: owner.to_string(),
        }
    }

    /// Every open position, regardless of owner.
    pub fn open_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.lock()?.positions.clone())
    }

    pub fn realized_pnl(&self) -> Result<Decimal, BrokerError> {
        Ok(self.lock()?.realized_pnl)
    }

    fn fill_price(&self, quote: Quote, side: Side) -> f64 {
        let slip = self.slippage_bps / 10_000.0;
        match side {
            Side::Buy => quote.ask * (1.0 + slip),
            Side::Sell => quote.bid * (1.0 - slip),
        }
    }

    fn open(
        &self,
        owner: &str,
        instrument: &Instrument,
        side: Side,
        units: u64,
    ) -> Result<Position, BrokerError> {
        if units == 0 {
            return Err(BrokerError::Rejected("order for zero units".to_string()));
        }

        let mut book = self.lock()?;
        let quote = *book
            .quotes
            .get(&instrument.name)
            .ok_or_else(|| BrokerError::NoQuote(instrument.name.clone()))?;

        let position = Position {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            pair: instrument.name.clone(),
            side,
            units,
            entry_price: self.fill_price(quote, side),
            opened_at: Utc::now(),
        };
        debug!(
            owner,
            pair = %position.pair,
            side = %side,
            units,
            price = position.entry_price,
            "Paper position opened"
        );
        book.positions.push(position.clone());
        Ok(position)
    }

    fn close_owned(&self, owner: &str, position: &Position) -> Result<(), BrokerError> {
        let mut book = self.lock()?;
        let idx = book
            .positions
            .iter()
            .position(|p| p.id == position.id && p.owner == owner)
            .ok_or(BrokerError::UnknownPosition(position.id))?;

        let quote = *book
            .quotes
            .get(&position.pair)
            .ok_or_else(|| BrokerError::NoQuote(position.pair.clone()))?;

        let open = book.positions.remove(idx);
        // Closing trades the opposite side.
        let (exit, pnl) = match open.side {
            Side::Buy => {
                let exit = self.fill_price(quote, Side::Sell);
                (exit, to_decimal(exit) - to_decimal(open.entry_price))
            }
            Side::Sell => {
                let exit = self.fill_price(quote, Side::Buy);
                (exit, to_decimal(open.entry_price) - to_decimal(exit))
            }
        };
        let pnl = pnl * Decimal::from(open.units);
        book.realized_pnl += pnl;

        debug!(
            owner,
            pair = %open.pair,
            side = %open.side,
            exit,
            pnl = %pnl,
            "Paper position closed"
        );
        Ok(())
    }
}

fn to_decimal(price: f64) -> Decimal {
    Decimal::from_f64_retain(price)
        .unwrap_or_default()
        .round_dp(6)
}

/// Per-agent view of a `PaperBroker`.
pub struct ScopedBroker {
    inner: Arc<PaperBroker>,
    owner: String,
}

impl Broker for ScopedBroker {
    fn buy(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError> {
        self.inner.open(&self.owner, instrument, Side::Buy, units)
    }

    fn sell(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError> {
        self.inner.open(&self.owner, instrument, Side::Sell, units)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self
            .inner
            .lock()?
            .positions
            .iter()
            .filter(|p| p.owner == self.owner)
            .cloned()
            .collect())
    }

    fn close(&self, position: &Position) -> Result<(), BrokerError> {
        self.inner.close_owned(&self.owner, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn usdjpy() -> Instrument {
        Instrument::new(0, "USDJPY")
    }

    fn quote(broker: &PaperBroker, bid: f64, ask: f64) {
        broker.update_quote(&Tick::new(
            "USDJPY",
            bid,
            ask,
            Utc.timestamp_opt(1_000, 0).unwrap(),
        ));
    }

    #[test]
    fn buy_fills_at_ask_with_slippage() {
        let broker = Arc::new(PaperBroker::new(10.0));
        quote(&broker, 100.0, 100.5);

        let position = broker.scoped("a").buy(&usdjpy(), 1000).unwrap();
        let expected = 100.5 * (1.0 + 10.0 / 10_000.0);
        assert!((position.entry_price - expected).abs() < 1e-9);
        assert_eq!(position.side, Side::Buy);
        assert_eq!(position.owner, "a");
    }

    #[test]
    fn order_without_quote_fails() {
        let broker = Arc::new(PaperBroker::new(0.0));
        let err = broker.scoped("a").sell(&usdjpy(), 1000).unwrap_err();
        assert_eq!(err, BrokerError::NoQuote("USDJPY".to_string()));
    }

    #[test]
    fn zero_units_are_rejected() {
        let broker = Arc::new(PaperBroker::new(0.0));
        quote(&broker, 100.0, 100.0);
        assert!(matches!(
            broker.scoped("a").buy(&usdjpy(), 0),
            Err(BrokerError::Rejected(_))
        ));
    }

    #[test]
    fn positions_are_scoped_to_their_owner() {
        let broker = Arc::new(PaperBroker::new(0.0));
        quote(&broker, 100.0, 100.0);
        let a = broker.scoped("a");
        let b = broker.scoped("b");

        let pos = a.buy(&usdjpy(), 1000).unwrap();
        b.sell(&usdjpy(), 1000).unwrap();

        assert_eq!(a.positions().unwrap().len(), 1);
        assert_eq!(b.positions().unwrap().len(), 1);
        assert_eq!(broker.open_positions().unwrap().len(), 2);
        assert_eq!(b.close(&pos), Err(BrokerError::UnknownPosition(pos.id)));
    }

    #[test]
    fn closing_realizes_pnl() {
        let broker = Arc::new(PaperBroker::new(0.0));
        let agent = broker.scoped("a");
        quote(&broker, 110.00, 110.02);
        let long = agent.buy(&usdjpy(), 1000).unwrap();
        let short = agent.sell(&usdjpy(), 1000).unwrap();

        quote(&broker, 110.10, 110.12);
        agent.close(&long).unwrap();
        agent.close(&short).unwrap();

        // long: (110.10 - 110.02) * 1000, short: (110.00 - 110.12) * 1000
        assert_eq!(broker.realized_pnl().unwrap(), dec!(-40));
        assert!(agent.positions().unwrap().is_empty());
    }
}
