//! Client-side state for the TrashToCash web app.
//!
//! The cart and the auth session are explicit store objects owned by the
//! application shell. Each mirrors its whole state into a [`SnapshotStore`]
//! after every mutation, the way the browser build mirrors into local
//! storage.

pub mod cart;
pub mod session;
pub mod storage;

pub use cart::{Cart, CartItem, CartSnapshot, CartWarning, ServiceSnapshot};
pub use session::{Session, SessionUser};
pub use storage::{FileStore, MemoryStore, SnapshotStore, StoreError};
