//! Trading signal generation.
//!
//! Only one strategy lives here: the fast/slow EMA crossover.

pub mod crossover;

pub use crossover::{ema, make_signals, SignalRow, SignalSeries};
