pub mod aggregate;
pub mod alignment;
pub mod engine;
pub mod metrics;

pub use self::aggregate::{MetricWeights, ScoreReport, aggregate};
pub use self::engine::{BatchSummary, Evaluation, EvaluationError, Evaluator};
pub use self::metrics::{CuePolicy, MetricKind, MetricScore, MetricSuite};
