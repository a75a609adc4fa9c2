mod backend;
mod entry;

pub use self::backend::{Backend, Credentials, NewBackend};
pub(crate) use self::backend::BackendRow;
pub use self::entry::{DiscoveredEntry, FileEntry};
pub(crate) use self::entry::FileRow;
