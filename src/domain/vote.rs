use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }

    pub fn weight(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// The requesting user's vote as shown to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserVote {
    Up,
    Down,
    None,
}

impl From<Option<VoteDirection>> for UserVote {
    fn from(direction: Option<VoteDirection>) -> Self {
        match direction {
            Some(VoteDirection::Up) => Self::Up,
            Some(VoteDirection::Down) => Self::Down,
            None => Self::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub target_id: Uuid,
    pub user_id: Uuid,
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub score: i64,
    pub user_vote: UserVote,
}

impl VoteTally {
    pub fn empty() -> Self {
        Self {
            score: 0,
            user_vote: UserVote::None,
        }
    }
}

/// Sums vote weights and picks out the viewer's own direction.
pub fn tally<'a, I>(votes: I, viewer_id: Option<Uuid>) -> VoteTally
where
    I: IntoIterator<Item = &'a Vote>,
{
    let mut score = 0;
    let mut own = None;
    for vote in votes {
        score += vote.direction.weight();
        if Some(vote.user_id) == viewer_id {
            own = Some(vote.direction);
        }
    }

    VoteTally {
        score,
        user_vote: own.into(),
    }
}

/// Result of applying a vote action to the stored (target, user) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub previous: Option<VoteDirection>,
    pub current: Option<VoteDirection>,
}

impl VoteChange {
    /// Repeating the stored direction retracts the vote; anything else
    /// leaves exactly one row holding the incoming direction.
    pub fn resolve(previous: Option<VoteDirection>, incoming: VoteDirection) -> Self {
        let current = if previous == Some(incoming) {
            None
        } else {
            Some(incoming)
        };
        Self { previous, current }
    }

    pub fn is_retraction(&self) -> bool {
        self.previous.is_some() && self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(user_id: Uuid, direction: VoteDirection) -> Vote {
        Vote {
            target_id: Uuid::nil(),
            user_id,
            direction,
        }
    }

    #[test]
    fn tally_sums_directions_and_finds_viewer() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let votes = vec![
            vote(a, VoteDirection::Up),
            vote(b, VoteDirection::Up),
            vote(c, VoteDirection::Down),
        ];

        let result = tally(&votes, Some(c));
        assert_eq!(result.score, 1);
        assert_eq!(result.user_vote, UserVote::Down);

        let anonymous = tally(&votes, None);
        assert_eq!(anonymous.score, 1);
        assert_eq!(anonymous.user_vote, UserVote::None);
    }

    #[test]
    fn tally_of_nothing_is_zero() {
        let votes: Vec<Vote> = Vec::new();
        assert_eq!(tally(&votes, Some(Uuid::new_v4())), VoteTally::empty());
    }

    #[test]
    fn same_direction_retracts() {
        let change = VoteChange::resolve(Some(VoteDirection::Up), VoteDirection::Up);
        assert_eq!(change.current, None);
        assert!(change.is_retraction());
    }

    #[test]
    fn opposite_direction_flips() {
        let change = VoteChange::resolve(Some(VoteDirection::Up), VoteDirection::Down);
        assert_eq!(change.current, Some(VoteDirection::Down));
        assert!(!change.is_retraction());
    }

    #[test]
    fn first_vote_is_recorded() {
        let change = VoteChange::resolve(None, VoteDirection::Down);
        assert_eq!(change.previous, None);
        assert_eq!(change.current, Some(VoteDirection::Down));
    }

    #[test]
    fn direction_db_names() {
        assert_eq!(VoteDirection::from_db("UP"), Some(VoteDirection::Up));
        assert_eq!(VoteDirection::from_db("down"), None);
        assert_eq!(VoteDirection::Down.as_db(), "DOWN");
    }
}
