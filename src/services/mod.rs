pub mod actions;
pub mod catalog;
pub mod k8s;
pub mod lifecycle;
pub mod probe;
pub mod store;

pub use actions::{ActionOutcome, ActionRunner, CommandRunner};
pub use catalog::{ActionSpec, Category, Component, ComponentCatalog, ProbeSpec};
pub use k8s::{ClusterSummary, K8sClient};
pub use lifecycle::{IntentAck, IntentStatus, LifecycleEngine, Operation, OperationKind};
pub use probe::{ClusterProber, ObservedState, Presence, Prober};
pub use store::{ComponentStatus, InstallRecord, StateStore};
