//! Data models for the lending server

pub mod book;
pub mod borrow_record;
pub mod id;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookStatus};
pub use borrow_record::BorrowRecord;
pub use id::{BookId, BorrowRecordId, UserId};
pub use user::{User, UserInfo};
