pub mod account;
pub mod decision;
pub mod kline;
pub mod ledger;
pub mod market;
pub mod order;

pub use account::{AccountSnapshot, Position, Side};
pub use decision::{CloseIntent, EntryIntent, Intent, RawDecision, Signal};
pub use kline::Candle;
pub use ledger::{LedgerAction, LedgerEntry};
pub use market::{MarketQuote, MarketSnapshot, SymbolMarket, Trend};
pub use order::{OrderAck, OrderKind, OrderRequest, OrderSide};
