pub mod page_manager;

pub use page_manager::PageManager;
