pub mod backoff;
pub mod execution_service;
pub mod operator_desk;
pub mod snapshot_service;
pub mod telegram_service;
pub mod trading_service;

#[cfg(test)]
pub mod test_support;
