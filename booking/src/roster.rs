//! Game rosters.
//!
//! A roster is the ordered list of players attached to a game. The creator is
//! always the first entry and stays confirmed until the game is cancelled.
//! Capacity is enforced against confirmed entries only.
//!
//! The roster itself is plain data: checks (`check_join`, `check_leave`) are
//! separate from mutations (`admit`, `withdraw`) so the game reducer can reject
//! an action without touching state. Atomicity against concurrent joins comes
//! from the game document's versioned write, not from the roster.

use crate::error::GameError;
use crate::types::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Membership state of a roster entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    /// Holds a place; counts against capacity
    Confirmed,
    /// Interested but not holding a place
    Tentative,
    /// Left the game
    Withdrawn,
}

/// One player on a roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The player
    pub player: PlayerId,
    /// When the player (last) joined
    pub joined_at: DateTime<Utc>,
    /// Current membership
    pub state: MembershipState,
}

impl RosterEntry {
    const fn is_member(&self) -> bool {
        matches!(
            self.state,
            MembershipState::Confirmed | MembershipState::Tentative
        )
    }
}

/// Ordered roster of a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// A roster holding only the creator, confirmed.
    #[must_use]
    pub fn seeded(creator: PlayerId, at: DateTime<Utc>) -> Self {
        Self {
            entries: vec![RosterEntry {
                player: creator,
                joined_at: at,
                state: MembershipState::Confirmed,
            }],
        }
    }

    /// All entries in roster order, withdrawn ones included
    #[must_use]
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// The first entry's player
    #[must_use]
    pub fn creator(&self) -> Option<PlayerId> {
        self.entries.first().map(|entry| entry.player)
    }

    /// Number of confirmed entries
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state == MembershipState::Confirmed)
            .count()
    }

    /// Whether `player` is a confirmed or tentative member
    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.player == player && entry.is_member())
    }

    /// Confirmed players in roster order
    pub fn confirmed(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.state == MembershipState::Confirmed)
            .map(|entry| entry.player)
    }

    /// Confirmed and tentative players in roster order
    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.is_member())
            .map(|entry| entry.player)
    }

    /// Roster-level join rules: a free confirmed place, then no duplicate membership.
    ///
    /// # Errors
    ///
    /// [`GameError::GameFull`] or [`GameError::AlreadyJoined`], in that order.
    pub fn check_join(&self, player: PlayerId, capacity: u32) -> Result<(), GameError> {
        if self.confirmed_count() >= capacity as usize {
            return Err(GameError::GameFull { capacity });
        }
        if self.contains(player) {
            return Err(GameError::AlreadyJoined { player });
        }
        Ok(())
    }

    /// Roster-level leave rules: not the creator, then a current member.
    ///
    /// # Errors
    ///
    /// [`GameError::CreatorCannotLeave`] or [`GameError::NotAParticipant`], in that order.
    pub fn check_leave(&self, player: PlayerId) -> Result<(), GameError> {
        if self.creator() == Some(player) {
            return Err(GameError::CreatorCannotLeave);
        }
        if !self.contains(player) {
            return Err(GameError::NotAParticipant { player });
        }
        Ok(())
    }

    /// Append `player` as confirmed. A withdrawn entry for the same player is
    /// moved to the end of the roster and revived.
    pub(crate) fn admit(&mut self, player: PlayerId, at: DateTime<Utc>) {
        self.entries
            .retain(|entry| !(entry.player == player && entry.state == MembershipState::Withdrawn));
        self.entries.push(RosterEntry {
            player,
            joined_at: at,
            state: MembershipState::Confirmed,
        });
    }

    /// Mark `player` withdrawn. The creator entry is never touched.
    pub(crate) fn withdraw(&mut self, player: PlayerId) {
        let creator = self.creator();
        for entry in &mut self.entries {
            if entry.player == player && Some(player) != creator && entry.is_member() {
                entry.state = MembershipState::Withdrawn;
            }
        }
    }
}
