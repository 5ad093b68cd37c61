//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` table.

use serde::Serialize;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID, if it names a known variant.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( v if v == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Field job lifecycle status.
    JobStatus {
        Open = 1,
        Assigned = 2,
        InProgress = 3,
        Completed = 4,
        Cancelled = 5,
    }
}

define_status_enum! {
    /// Outbound notification delivery status.
    NotificationStatus {
        Pending = 1,
        Sent = 2,
        Failed = 3,
    }
}

impl JobStatus {
    /// Completed and cancelled jobs never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Assigned and in-progress jobs must carry exactly one live assignment.
    pub fn requires_assignment(self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress)
    }
}

impl NotificationStatus {
    /// Sent and failed intents are never attempted again automatically.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}
