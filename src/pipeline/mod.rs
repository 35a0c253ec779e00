//! The copy-trading event pipeline: monitor, dedup cache, fan-out
//! distributor, worker registry, per-worker executor with its aggregation
//! buffer and paper trader, and the external collaborator contracts they
//! depend on.

pub mod dedup;
pub mod distributor;
pub mod executor;
pub mod external;
pub mod monitor;
pub mod paper;
pub mod registry;
pub mod types;

pub use dedup::DedupCache;
pub use distributor::Distributor;
pub use executor::{Executor, ExecutorConfig};
pub use external::{
    BalanceClient, OrderSubmission, OrderSubmitter, PolymarketBalanceClient,
    PolymarketPositionsClient, PositionsClient,
};
pub use monitor::{ActivityFeed, Monitor, PolymarketActivityFeed};
pub use paper::PaperTrader;
pub use registry::{WorkerHandle, WorkerId, WorkerMessage, WorkerRegistry};
pub use types::{Activity, AggregatedTrade, Position, QueueActivity, Side};
