pub mod access;
pub mod content;
pub mod error;
pub mod merge;
pub mod models;
pub mod view;
