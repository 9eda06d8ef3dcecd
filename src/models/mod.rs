pub mod change_set;
pub mod distribution;
pub mod release;
pub mod subscription;

pub use change_set::{ChangeSet, CommitInfo, PullRequestInfo, ReleaseEvent, ReleaseSummary};
pub use distribution::{ChannelKind, DistributionOutcome, DistributionTarget, OutcomeRecord};
pub use release::{
    Audience, BackfillReport, BackfillRequest, EditNotesRequest, GeneratedNotes,
    RegenerateRequest, Release, ReleaseDetail, ReleaseNotes, ReleaseStatus,
};
pub use subscription::{
    ChannelSpec, ConnectRepoRequest, NotificationChannel, RepoSubscription, StyleConfig,
};
