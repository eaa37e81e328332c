pub mod accumulator;
pub mod collector;
pub mod environment;
pub mod extractor;
pub mod policy;
pub mod reveal;
pub mod serializer;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use accumulator::{Admission, HarvestState};
pub use collector::{Collector, HarvestOutcome, Step};
pub use environment::Environment;
pub use extractor::RecordExtractor;
pub use policy::{StopReason, TerminationPolicy};
pub use reveal::{RevealChain, RevealOutcome, RevealStrategy};
pub use serializer::{quote_field, to_csv, to_flat_rows, to_hierarchical, FlatRow, CSV_HEADER};
pub use stats::HarvestStats;
