pub mod delete;
pub mod list;
pub mod sync;
pub mod upload;

pub use delete::delete;
pub use list::list;
pub use sync::sync;
pub use upload::upload;
