//! Configuration access port trait.
//!
//! Values come back as raw text; typed parsing and validation live in
//! `domain::config_validation`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// Every `key = value` pair of a section, sorted by key. Empty when the
    /// section is absent.
    fn section_entries(&self, section: &str) -> Vec<(String, String)>;
}
