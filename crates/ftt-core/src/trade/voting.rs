// Commissioner vote tallying.

use serde::Serialize;

use crate::trade::model::Vote;

/// Vote counts among regular (non-admin) commissioners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub approve: u32,
    pub veto: u32,
    /// Commissioners eligible to vote, voted or not.
    pub total: u32,
}

impl Tally {
    pub fn count<'a>(votes: impl IntoIterator<Item = &'a Vote>, total: u32) -> Self {
        let mut tally = Tally {
            total,
            ..Tally::default()
        };
        for vote in votes {
            match vote {
                Vote::Approve => tally.approve += 1,
                Vote::Veto => tally.veto += 1,
            }
        }
        tally
    }

    pub fn majority_needed(&self) -> u32 {
        self.total / 2 + 1
    }

    pub fn decide(&self) -> Decision {
        let needed = self.majority_needed();
        if self.approve >= needed {
            Decision::Approved
        } else if self.veto >= needed {
            Decision::Vetoed
        } else {
            Decision::Pending {
                votes_needed: needed.saturating_sub(self.approve),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Vetoed,
    /// Approvals still required for a majority.
    Pending { votes_needed: u32 },
}

impl Decision {
    pub fn is_final(&self) -> bool {
        !matches!(self, Decision::Pending { .. })
    }
}

/// An admin's ballot settles the trade on its own.
pub fn admin_decision(vote: Vote) -> Decision {
    match vote {
        Vote::Approve => Decision::Approved,
        Vote::Veto => Decision::Vetoed,
    }
}
