//! Application services for the oompa swarm system.

pub mod merge;
pub mod prompt;
pub mod recorder;
pub mod review;
pub mod shutdown;
pub mod swarm;
pub mod task_store;
pub mod worker;
pub mod workspace;

pub use merge::MergeCoordinator;
pub use recorder::EventRecorder;
pub use review::{parse_verdict, FixContext, ReviewLoop, ReviewOutcome};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use swarm::SwarmCoordinator;
pub use task_store::TaskStore;
pub use worker::{WorkerEngine, WorkerSummary};
pub use workspace::{SyncOutcome, WorkspaceService};
