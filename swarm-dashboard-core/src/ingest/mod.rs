//! Ingestion layer for agent log files
//!
//! ```text
//! ┌──────────────┐  advance   ┌─────────────┐
//! │ SwarmMonitor │ ─────────► │ CursorStore │
//! │              │            └─────────────┘
//! │              │  get/put   ┌─────────────┐
//! │              │ ─────────► │ ResultCache │
//! │              │            └─────────────┘
//! │              │  read_new  ┌─────────────┐
//! │              │ ─────────► │   reader    │ ──► EventRecord
//! └──────────────┘            └─────────────┘
//! ```
//!
//! The monitor always asks the cursor store where to resume, consults the
//! cache for that exact range, and only falls back to the reader on a miss.
//! The cursor is committed after the batch has been folded into agent state.

pub mod cache;
pub mod cursor;
pub mod discovery;
pub mod reader;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use cursor::{Cursor, CursorStore};
pub use discovery::find_agent_log;
pub use reader::{read_new, ReadBatch};
