//! Operator callbacks
//!
//! The engine never talks to a user interface directly. Whatever front
//! end drives it passes an [`OperatorInterface`] to the constructor.

use std::path::PathBuf;

/// Questions and notifications addressed to the operator
pub trait OperatorInterface {
    /// Yes/no question; `true` means go ahead
    fn ask_confirmation(&mut self, title: &str, message: &str) -> bool;

    /// Pick a file; `None` if the operator cancels
    fn select_file(&mut self, title: &str, filters: &[&str]) -> Option<PathBuf>;

    fn show_error(&mut self, title: &str, message: &str);

    fn show_warning(&mut self, title: &str, message: &str);

    fn show_info(&mut self, title: &str, message: &str);
}

/// Operator that answers every question the same way and logs messages
///
/// For scripted runs without a human in the loop.
#[derive(Debug, Clone)]
pub struct HeadlessOperator {
    confirm: bool,
    file: Option<PathBuf>,
}

impl HeadlessOperator {
    /// Answer all confirmations with `confirm`
    pub fn new(confirm: bool) -> Self {
        Self {
            confirm,
            file: None,
        }
    }

    /// Answer file selections with `file`
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl OperatorInterface for HeadlessOperator {
    fn ask_confirmation(&mut self, title: &str, message: &str) -> bool {
        crate::log_info!("{}: {} -> {}", title, message, if self.confirm { "yes" } else { "no" });
        self.confirm
    }

    fn select_file(&mut self, title: &str, _filters: &[&str]) -> Option<PathBuf> {
        crate::log_info!("{}: {:?}", title, self.file);
        self.file.clone()
    }

    fn show_error(&mut self, title: &str, message: &str) {
        crate::log_error!("{}: {}", title, message);
    }

    fn show_warning(&mut self, title: &str, message: &str) {
        crate::log_warn!("{}: {}", title, message);
    }

    fn show_info(&mut self, title: &str, message: &str) {
        crate::log_info!("{}: {}", title, message);
    }
}
