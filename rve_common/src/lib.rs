mod money;

pub mod op;

pub use money::{MoneyAmount, MoneyConversionError, RUB_CURRENCY_CODE, RUB_CURRENCY_CODE_LOWER};
