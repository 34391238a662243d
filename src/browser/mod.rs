//! Browser adapter: launch, page driving, and the JS it evaluates.

pub mod js_scripts;
pub mod launch;
pub mod page;

pub use launch::{download_managed_browser, find_browser_executable, launch_browser};
pub use page::{PageDriver, with_page_timeout};
