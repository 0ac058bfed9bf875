//! Maximum-weight spanning arborescence search.

pub mod arborescence;
pub mod chu_liu_edmonds;

pub use arborescence::Arborescence;
pub use chu_liu_edmonds::max_arborescence;
