//! Typed identity references
//!
//! Every entity is keyed by a UUID assigned by the store on creation. Clients
//! exchange ids as strings; a string that does not parse is a client input
//! error, never a storage error.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, ToSchema, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh id
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse an id supplied by a client
            pub fn parse(raw: &str) -> AppResult<Self> {
                raw.parse()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| AppError::InvalidArgument(format!("invalid {} ID: {:?}", $label, s)))
            }
        }
    };
}

define_id!(
    /// Identity of a book in the catalog
    BookId,
    "book"
);

define_id!(
    /// Identity of a registered user
    UserId,
    "user"
);

define_id!(
    /// Identity of a borrow record (loan)
    BorrowRecordId,
    "borrow"
);
