pub mod ledger;
pub mod run_state;

pub use ledger::{LEDGER_CAPACITY, TradeLedger};
pub use run_state::RunState;
