//! Pending notification actions
//!
//! Events only ever add actions to an [`ActionSet`]. The set is read once at
//! the end of a batch, where the lifecycle actions are ranked
//! `Close > Reset > Update`; the thumbnail actions are independent of that
//! ranking.

use std::fmt;

/// A single pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open or reopen the notification and restart the expire timer
    Reset,
    /// Refresh an already open notification
    Update,
    /// Close the notification unless it is forced open
    Close,
    /// Request a screenshot if the expire timer is armed
    QueueShot,
    /// Request a screenshot regardless of the timer
    ForcedQueueShot,
    /// Re-evaluate whether thumbnails should be sent at all
    CheckImage,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Reset,
        Action::Update,
        Action::Close,
        Action::QueueShot,
        Action::ForcedQueueShot,
        Action::CheckImage,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// The lifecycle operation a batch resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    None,
    Update,
    Reset,
    Close,
}

/// Small set of [`Action`]s accumulated during one batch
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSet(u8);

impl ActionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn extend(&mut self, other: ActionSet) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Highest-ranked lifecycle action in the set.
    ///
    /// `force_open` strips `Close`, which then lets `Reset`/`Update` through.
    pub fn lifecycle(self, force_open: bool) -> Lifecycle {
        if self.contains(Action::Close) && !force_open {
            Lifecycle::Close
        } else if self.contains(Action::Reset) {
            Lifecycle::Reset
        } else if self.contains(Action::Update) {
            Lifecycle::Update
        } else {
            Lifecycle::None
        }
    }

    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl From<Action> for ActionSet {
    fn from(action: Action) -> Self {
        Self(action.bit())
    }
}

impl<const N: usize> From<[Action; N]> for ActionSet {
    fn from(actions: [Action; N]) -> Self {
        let mut set = Self::empty();
        for action in actions {
            set.insert(action);
        }
        set
    }
}

impl std::ops::BitOr<Action> for ActionSet {
    type Output = ActionSet;

    fn bitor(mut self, rhs: Action) -> ActionSet {
        self.insert(rhs);
        self
    }
}

impl std::ops::BitOrAssign<Action> for ActionSet {
    fn bitor_assign(&mut self, rhs: Action) {
        self.insert(rhs);
    }
}

impl std::ops::BitOrAssign for ActionSet {
    fn bitor_assign(&mut self, rhs: ActionSet) {
        self.extend(rhs);
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
