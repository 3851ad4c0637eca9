//! Borrow record (loan) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::id::{BookId, BorrowRecordId, UserId};

/// A loan of one book to one user. Open while `returned_at` is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: BorrowRecordId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Whether this loan counts as overdue for the given cutoff (strictly older)
    pub fn is_overdue_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_open() && self.borrowed_at < cutoff
    }
}

/// A loan about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub book_id: BookId,
    pub user_id: UserId,
    pub borrowed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_overdue_cutoff_is_strict() {
        let cutoff = Utc::now();
        let mut record = BorrowRecord {
            id: BorrowRecordId::generate(),
            book_id: BookId::generate(),
            user_id: UserId::generate(),
            borrowed_at: cutoff,
            returned_at: None,
        };
        assert!(!record.is_overdue_at(cutoff));

        record.borrowed_at = cutoff - Duration::seconds(1);
        assert!(record.is_overdue_at(cutoff));

        record.returned_at = Some(cutoff);
        assert!(!record.is_overdue_at(cutoff));
    }
}
