//! Blockchain lifecycle as a pure transition table.
//!
//! `transition` maps a state and an event to the next state plus the entry
//! actions to run. Running the actions is the blockchain service's job; an
//! action may yield a follow-up event which is fed back through the table.

use std::fmt;

/// Sub-states of `SyncWithNetwork`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncState {
    Syncing,
    DownloadBlocks,
    DownloadFinished,
    DownloadPaused,
    ProcessFinished,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockchainState {
    Uninitialised,
    Init,
    Rollback,
    SyncWithNetwork(SyncState),
    Idle,
    ProcessingBlocks,
    Fork,
    Stopped,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Start,
    NewBlock,
    Wakeup,
    Fork,
    ProcessFinished,
    Stop,
    Started,
    Failure,
    Rollback,
    Synced,
    NotSynced,
    Paused,
    NetworkHalted,
    Downloaded,
    NoBlock,
    SyncFinished,
    Success,
}

/// Entry actions, run in order when a state is entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Init,
    RollbackDatabase,
    CheckLastDownloadedBlockSynced,
    DownloadBlocks,
    DownloadFinished,
    DownloadPaused,
    CheckLastBlockSynced,
    SyncingComplete,
    CheckLater,
    BlockchainReady,
    StartForkRecovery,
    Stopped,
    ExitApp,
}

/// Result of feeding one event to the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: BlockchainState,
    pub actions: Vec<Action>,
    pub changed: bool,
}

impl fmt::Display for BlockchainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialised => f.write_str("uninitialised"),
            Self::Init => f.write_str("init"),
            Self::Rollback => f.write_str("rollback"),
            Self::SyncWithNetwork(sub) => write!(f, "syncWithNetwork.{}", sub.name()),
            Self::Idle => f.write_str("idle"),
            Self::ProcessingBlocks => f.write_str("processingBlocks"),
            Self::Fork => f.write_str("fork"),
            Self::Stopped => f.write_str("stopped"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

impl SyncState {
    fn name(&self) -> &'static str {
        match self {
            Self::Syncing => "syncing",
            Self::DownloadBlocks => "downloadBlocks",
            Self::DownloadFinished => "downloadFinished",
            Self::DownloadPaused => "downloadPaused",
            Self::ProcessFinished => "processFinished",
            Self::End => "end",
        }
    }
}

impl BlockchainState {
    /// Actions run when the state is entered.
    pub fn entry_actions(&self) -> Vec<Action> {
        use Action::*;
        match self {
            Self::Uninitialised => vec![],
            Self::Init => vec![Init],
            Self::Rollback => vec![RollbackDatabase],
            Self::SyncWithNetwork(sub) => match sub {
                SyncState::Syncing => vec![CheckLastDownloadedBlockSynced],
                SyncState::DownloadBlocks => vec![DownloadBlocks],
                SyncState::DownloadFinished => vec![DownloadFinished],
                SyncState::DownloadPaused => vec![DownloadPaused],
                SyncState::ProcessFinished => vec![CheckLastBlockSynced],
                SyncState::End => vec![SyncingComplete],
            },
            Self::Idle => vec![CheckLater, BlockchainReady],
            Self::ProcessingBlocks => vec![],
            Self::Fork => vec![StartForkRecovery],
            Self::Stopped => vec![Stopped],
            Self::Exit => vec![ExitApp],
        }
    }

    /// Whether the node has gone through `init` and not yet stopped.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Uninitialised | Self::Stopped | Self::Exit)
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::SyncWithNetwork(_))
    }
}

/// The next state for `event` in `state`. Events a state does not handle
/// leave it unchanged with no actions.
pub fn transition(state: BlockchainState, event: Event) -> Transition {
    match next_state(state, event) {
        Some(next) => Transition { state: next, actions: next.entry_actions(), changed: true },
        None => Transition { state, actions: Vec::new(), changed: false },
    }
}

fn next_state(state: BlockchainState, event: Event) -> Option<BlockchainState> {
    use BlockchainState as S;
    use Event as E;
    use SyncState as Sub;

    let next = match (state, event) {
        (S::Uninitialised, E::Start) => S::Init,
        (S::Uninitialised, E::Stop) => S::Stopped,

        (S::Init, E::Started) => S::SyncWithNetwork(Sub::Syncing),
        (S::Init, E::Rollback) => S::Rollback,
        (S::Init, E::Failure) => S::Exit,
        (S::Init, E::Stop) => S::Stopped,

        (S::Rollback, E::Success) => S::Init,
        (S::Rollback, E::Failure) => S::Exit,
        (S::Rollback, E::Stop) => S::Stopped,

        (S::SyncWithNetwork(sub), event) => match (sub, event) {
            (_, E::SyncFinished) => S::Idle,
            (_, E::Fork) => S::Fork,
            (_, E::Stop) => S::Stopped,

            (Sub::Syncing, E::Synced) => S::SyncWithNetwork(Sub::DownloadFinished),
            (Sub::Syncing, E::NotSynced) => S::SyncWithNetwork(Sub::DownloadBlocks),
            (Sub::Syncing, E::Paused) => S::SyncWithNetwork(Sub::DownloadPaused),
            (Sub::Syncing, E::NetworkHalted) => S::SyncWithNetwork(Sub::End),

            (Sub::DownloadBlocks, E::Downloaded) => S::SyncWithNetwork(Sub::Syncing),
            (Sub::DownloadBlocks, E::NoBlock) => S::SyncWithNetwork(Sub::Syncing),
            (Sub::DownloadBlocks, E::ProcessFinished) => S::SyncWithNetwork(Sub::DownloadFinished),

            (Sub::DownloadFinished, E::ProcessFinished) => S::SyncWithNetwork(Sub::ProcessFinished),
            (Sub::DownloadPaused, E::ProcessFinished) => S::SyncWithNetwork(Sub::ProcessFinished),

            (Sub::ProcessFinished, E::Synced) => S::SyncWithNetwork(Sub::End),
            (Sub::ProcessFinished, E::NotSynced) => S::SyncWithNetwork(Sub::DownloadBlocks),

            _ => return None,
        },

        (S::Idle, E::Wakeup) => S::SyncWithNetwork(Sub::Syncing),
        (S::Idle, E::NewBlock) => S::ProcessingBlocks,
        (S::Idle, E::Stop) => S::Stopped,

        (S::ProcessingBlocks, E::ProcessFinished) => S::Idle,
        (S::ProcessingBlocks, E::Fork) => S::Fork,
        (S::ProcessingBlocks, E::Stop) => S::Stopped,

        (S::Fork, E::Success) => S::SyncWithNetwork(Sub::Syncing),
        (S::Fork, E::Failure) => S::Exit,
        (S::Fork, E::Stop) => S::Stopped,

        _ => return None,
    };
    Some(next)
}
