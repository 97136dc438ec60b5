/// Integrity-checked operations over a [`crate::DocumentStore`].
///
/// [`Sector`] is the embedded implementation of [`crate::SectorStore`]; the
/// search engine in [`search`] is shared with it.
pub mod locks;
pub mod search;
pub mod sector;

pub use locks::IdLocks;
pub use search::Filter;
pub use sector::Sector;
