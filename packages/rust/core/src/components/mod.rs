//! Built-in pipeline components.

mod copy;
mod links;
mod save;

pub use copy::{CopyFromIndexComponent, MissingPolicy};
pub use links::ResolveLinksComponent;
pub use save::{SaveComponent, sanitize_file_name};
