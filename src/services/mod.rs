pub mod kanji_lookup;
pub mod reading;
