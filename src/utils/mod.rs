pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{glob_to_regex, is_valid_url, normalize_url, resolve_url, same_origin};
