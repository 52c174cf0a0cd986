pub mod kanji;
pub mod links;
pub mod schedule;
pub mod sets;
pub mod units;
