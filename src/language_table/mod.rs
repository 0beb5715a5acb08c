//! # Demo language table
//!
//! Generates the language list of the translation demo: a JavaScript module exporting
//! `languageTable`, an array of `{"en", "abs", "chinese", "pinyin"}` objects in which the most
//! used languages and the languages of the main families come first.
//!
//! ```no_run
//! use multilingual_m2m::language_table::{
//!     order_records, read_language_records_xlsx, write_language_table, LanguageTableConfig,
//! };
//! use std::fs::File;
//!
//! # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
//! let records = read_language_records_xlsx("langid2lang_chinese.xlsx")?;
//! let ordered = order_records(&records, &LanguageTableConfig::default());
//! write_language_table(File::create("data.js")?, &ordered)?;
//! # Ok(())
//! # }
//! ```

mod records;
mod table;

pub use records::{
    read_language_records, read_language_records_xlsx, romanize, LanguageRecord,
};
pub use table::{order_records, write_language_table, LanguageTableConfig};
