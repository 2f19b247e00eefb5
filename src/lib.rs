pub mod backtest;
pub mod config;
pub mod data;
pub mod metrics;
pub mod regime;
pub mod results;
pub mod signals;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use backtest::{BacktestConfig, BacktestEngine, BacktestResult, CommissionModel, ExecutionMode, SlippageModel};
pub use config::{ConfigError, RunConfig};
pub use data::{DataLoader, InMemoryProvider, LoaderError, PriceBar, PriceProvider, PriceSeries};
pub use metrics::{MetricsCalculator, PerformanceStats};
pub use regime::{RegimeClassifier, RegimeClassifierConfig, RegimeError};
pub use results::{AggregateError, AggregateResult, AggregateRunner, ResultsWriter, TickerResult};
pub use signals::{make_signals, SignalSeries};
pub use validation::{DataIntegrityReport, DataIntegrityValidator};
pub use walkforward::{
    Fold, FoldOutcome, FoldSummary, ParameterGrid, ParameterSet, RegimeRow, WalkForwardConfig,
    WalkForwardError, WalkForwardOptimizer, WalkForwardResult,
};
