pub mod delete;
pub mod file;
pub mod list;
pub mod serve;
pub mod upload;

// Re-export handler functions
pub use delete::handle_delete;
pub use serve::handle_serve;
pub use upload::handle_upload;
