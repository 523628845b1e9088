// Library surface for the binary, integration tests and reuse.
pub mod analysis;
pub mod app_dirs;
pub mod classifier;
pub mod config;
pub mod error;
pub mod input;
pub mod keyboard;
pub mod ledger;
pub mod pager;
pub mod ranges;
pub mod segmenter;
pub mod session;
pub mod store;
pub mod util;

pub use error::{Error, PatternError, Result, StorageError};
pub use ledger::{Key, KeystrokeEvent, Ledger, MemoryLedger, Sequence, SequenceId};
pub use session::RecordingSession;
pub use store::{Store, TextEdit, TextRecord};
