//! Work distribution, dependency ordering, id translation, and the
//! extraction/restoration orchestrators built on top of
//! `lookervault-client` and `lookervault-store`.

mod coordinator;
mod deps;
mod extract;
mod idmap;
mod queue;
mod restore;

pub use coordinator::{MultiFolderOffsetCoordinator, OffsetCoordinator};
pub use deps::{topological_order, DependencyError};
pub use extract::{
    ExtractionConfig, ExtractionError, ExtractionOrchestrator, ExtractionResult,
};
pub use idmap::{IdMapper, IdMappingError};
pub use queue::{QueueClosed, WorkQueue};
pub use restore::{
    RestorationConfig, RestorationError, RestorationOrchestrator, RestorationSummary,
    RestoreItemError, RestoreOperation, RestorationResult, Restorer, TypeSummary,
};
