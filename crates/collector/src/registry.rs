//! Maps exchange names from configuration to adapter instances.

use std::sync::Arc;

use scoa_core::config::ExchangeConfig;
use scoa_core::error::ExchangeError;
use scoa_core::exchange::Exchange;
use scoa_exchange_binance::BinanceExchange;
use scoa_exchange_htx::HtxExchange;

/// Constructs the adapter for a named exchange.
///
/// # Errors
/// Returns an error for unknown exchange names or when the adapter cannot
/// be constructed.
pub fn build_adapter(
    name: &str,
    config: &ExchangeConfig,
) -> Result<Arc<dyn Exchange>, ExchangeError> {
    match name.to_lowercase().as_str() {
        "binance" => Ok(Arc::new(BinanceExchange::new(config.clone())?)),
        "htx" => Ok(Arc::new(HtxExchange::new(config.clone())?)),
        other => Err(ExchangeError::Configuration(format!(
            "unknown exchange type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_exchanges_construct() {
        let config = ExchangeConfig::default();

        assert_eq!(build_adapter("binance", &config).unwrap().name(), "binance");
        assert_eq!(build_adapter("HTX", &config).unwrap().name(), "htx");
    }

    #[test]
    fn unknown_exchange_is_rejected() {
        let err = match build_adapter("mtgox", &ExchangeConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("expected error for unknown exchange"),
        };
        assert!(err.to_string().contains("mtgox"));
    }
}
