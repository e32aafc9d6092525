//! Device operation catalogue.
//!
//! Each variant serialises to the `operation` claim of a signed token, tagged
//! by `type`:
//!
//! ```json
//! {"type": "MUTATE_LOCK", "locked": false, "duration": 5}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Access level granted by a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// Recurring window during which the lock stays open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockBetween {
    /// Local start time, `HH:MM`.
    pub start: String,
    /// Local end time, `HH:MM`.
    pub end: String,
    /// IANA timezone name.
    pub timezone: String,
    pub days: Vec<Weekday>,
    /// Dates (`YYYY-MM-DD`) on which the window does not apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
}

/// User a device is shared with, as returned by a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTarget {
    pub user_id: String,
    /// The user's own ephemeral public key.
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceOperation {
    MutateLock {
        locked: bool,
        /// Seconds to stay unlocked; device default when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },
    MutateSetting {
        #[serde(
            rename = "unlockBetween",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        unlock_between: Option<UnlockBetween>,
        #[serde(
            rename = "unlockDuration",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        unlock_duration: Option<u64>,
    },
    AddUser {
        #[serde(rename = "publicKey")]
        public_key: String,
        user: String,
        role: UserRole,
        /// Unix seconds the share starts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<u64>,
        /// Unix seconds the share ends.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<u64>,
    },
    RemoveUser {
        users: Vec<String>,
    },
}

impl DeviceOperation {
    pub fn lock() -> Self {
        DeviceOperation::MutateLock {
            locked: true,
            duration: None,
        }
    }

    pub fn unlock(duration: Option<u64>) -> Self {
        DeviceOperation::MutateLock {
            locked: false,
            duration,
        }
    }

    pub fn open_hours(window: UnlockBetween) -> Self {
        DeviceOperation::MutateSetting {
            unlock_between: Some(window),
            unlock_duration: None,
        }
    }

    pub fn unlock_time(seconds: u64) -> Self {
        DeviceOperation::MutateSetting {
            unlock_between: None,
            unlock_duration: Some(seconds),
        }
    }

    /// Grant `target` access. Without `start` and `end` the share is permanent;
    /// whichever bound is given is sent as is.
    pub fn share(
        target: &ShareTarget,
        role: UserRole,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Self {
        DeviceOperation::AddUser {
            public_key: target.public_key.clone(),
            user: target.user_id.clone(),
            role,
            start,
            end,
        }
    }

    /// Re-adding a user with a different role replaces their role.
    pub fn change_role(target: &ShareTarget, role: UserRole) -> Self {
        Self::share(target, role, None, None)
    }

    pub fn remove_users(users: Vec<String>) -> Self {
        DeviceOperation::RemoveUser { users }
    }

    /// Wire name of the operation, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceOperation::MutateLock { .. } => "MUTATE_LOCK",
            DeviceOperation::MutateSetting { .. } => "MUTATE_SETTING",
            DeviceOperation::AddUser { .. } => "ADD_USER",
            DeviceOperation::RemoveUser { .. } => "REMOVE_USER",
        }
    }

    /// Value of the token's `operation` claim.
    pub fn to_claim(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
