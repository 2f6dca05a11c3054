pub mod artifact;
pub mod store;

pub use artifact::{SnapshotArtifact, SnapshotMetadata, SnapshotName, SnapshotTeam};
pub use store::SnapshotStore;
