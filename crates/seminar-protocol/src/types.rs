//! Core vocabulary shared by every layer: identity newtypes, the role
//! ordering, and the session lifecycle enums.
//!
//! Everything here travels on the wire at some point, so the serde shapes
//! are part of the public contract and pinned by tests below.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Unique identifier for a discussion session.
///
/// `#[serde(transparent)]` keeps the JSON representation a plain uuid
/// string rather than a wrapper object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a user, as issued by the external role authority.
///
/// Opaque — the coordination layer never inspects its contents, it only
/// compares and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A user's platform role, totally ordered from least to most privileged.
///
/// The declaration order of the variants IS the privilege order —
/// `PartialOrd`/`Ord` come straight from it, so `role >= Role::Instructor`
/// is the canonical staff check.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
    Superadmin,
}

impl Role {
    /// `true` for roles allowed to create sessions, close them, and remove
    /// participants. Instructors are further restricted to sessions they
    /// created; that ownership check lives in the lifecycle service.
    pub fn can_moderate(&self) -> bool {
        *self >= Role::Instructor
    }

    /// `true` for roles allowed to delete sessions outright.
    pub fn can_administer(&self) -> bool {
        *self >= Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a session.
///
/// Transitions are monotonic and `Closed` is terminal:
///
/// ```text
/// Upcoming ──(initiate | start time reached)──→ Active
///    │                                            │
///    └──────────(manual close)──→ Closed ←────────┘
///                                   (end time reached | manual close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Upcoming,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// `true` if live connections may still join a session in this state.
    pub fn is_joinable(&self) -> bool {
        !self.is_closed()
    }

    /// Returns `true` if moving to `target` respects the monotonic order.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Upcoming, Self::Active)
                | (Self::Upcoming, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// What kind of discussion a session hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Student-led group discussion.
    Peer,
    /// Instructor-led session.
    Instructor,
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The scheduled end time passed (status check or sweep).
    TimeExpired,
    /// A moderator closed the session explicitly.
    ManualClosure,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TimeExpired => "time_expired",
            Self::ManualClosure => "manual_closure",
        };
        write!(f, "{s}")
    }
}

// =========================================================================
// Tests
// =========================================================================
