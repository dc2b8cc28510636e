pub mod synthetic;

pub use synthetic::{simulate_new_candle, SyntheticDataGenerator};
