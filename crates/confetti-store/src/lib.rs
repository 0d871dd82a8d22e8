//! Record stores for Confetti.
//!
//! - [`SqliteStore`]: durable store used by the daemon
//! - [`MemoryStore`]: process-local store for tests and dry runs
//!
//! Both implement [`confetti_core::BirthdayStore`]. A single process gets
//! read-your-writes consistency from either; the same-day notification claim
//! is a conditional update so concurrent ticks cannot both acquire it.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
