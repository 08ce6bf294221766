use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Outcome of recording one juror's vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStatus {
    /// Every juror approved; the round is closed.
    Approved,
    /// Still waiting on this many jurors.
    Waiting(usize),
    /// No open round for this transaction.
    Unknown,
}

/// Tracks which neighbors still have to approve a submitted transaction.
///
/// The node only talks to this trait so the approval policy can change
/// without touching the message handlers.
pub trait ApprovalCoordinator: Send {
    /// Open a round for `tx_hash`, waiting on every ID in `jury`.
    fn start_round(&mut self, tx_hash: &str, jury: Vec<String>);

    fn record_approval(&mut self, tx_hash: &str, juror: &str) -> RoundStatus;

    fn record_rejection(&mut self, tx_hash: &str, juror: &str) -> RoundStatus;

    /// Jurors that have not approved `tx_hash` yet.
    fn awaiting(&self, tx_hash: &str) -> Option<Vec<String>>;

    /// Every open round as tx hash -> awaited jurors.
    fn open_rounds(&self) -> HashMap<String, Vec<String>>;
}

/// A transaction is committed only once every neighbor asked has said OK.
///
/// A rejection or a silent neighbor leaves the round open forever; there is
/// no timeout and no retry.
#[derive(Debug, Default)]
pub struct UnanimousApproval {
    rounds: HashMap<String, HashSet<String>>,
    rejected: HashSet<String>,
}

impl UnanimousApproval {
    pub fn new() -> UnanimousApproval {
        UnanimousApproval::default()
    }

    pub fn is_rejected(&self, tx_hash: &str) -> bool {
        self.rejected.contains(tx_hash)
    }
}

impl ApprovalCoordinator for UnanimousApproval {
    fn start_round(&mut self, tx_hash: &str, jury: Vec<String>) {
        debug!("Approval round for {tx_hash} waits on {} peers", jury.len());
        self.rejected.remove(tx_hash);
        self.rounds
            .insert(tx_hash.to_string(), jury.into_iter().collect());
    }

    fn record_approval(&mut self, tx_hash: &str, juror: &str) -> RoundStatus {
        let jury = match self.rounds.get_mut(tx_hash) {
            Some(jury) => jury,
            None => return RoundStatus::Unknown,
        };
        if !jury.remove(juror) {
            debug!("Ignoring approval of {tx_hash} from {juror}, not awaited");
        }
        if !jury.is_empty() || self.rejected.contains(tx_hash) {
            return RoundStatus::Waiting(jury.len());
        }
        self.rounds.remove(tx_hash);
        RoundStatus::Approved
    }

    fn record_rejection(&mut self, tx_hash: &str, juror: &str) -> RoundStatus {
        match self.rounds.get(tx_hash) {
            Some(jury) => {
                warn!("Peer {juror} rejected transaction {tx_hash}, the round is stalled");
                self.rejected.insert(tx_hash.to_string());
                RoundStatus::Waiting(jury.len())
            }
            None => RoundStatus::Unknown,
        }
    }

    fn awaiting(&self, tx_hash: &str) -> Option<Vec<String>> {
        self.rounds
            .get(tx_hash)
            .map(|jury| jury.iter().cloned().collect())
    }

    fn open_rounds(&self) -> HashMap<String, Vec<String>> {
        self.rounds
            .iter()
            .map(|(hash, jury)| (hash.clone(), jury.iter().cloned().collect()))
            .collect()
    }
}
