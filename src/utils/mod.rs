//! Utility modules.

pub mod file;
pub mod tokens;

pub use file::{
    calculate_checksum, check_file_size, is_pdf_file, is_text_file, read_file_content,
};
pub use tokens::{count_tokens, estimate_tokens};
