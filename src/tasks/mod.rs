//! Background execution with completion marshaled onto a single UI loop.
//!
//! Work runs on the tokio runtime (async tasks or blocking threads) and
//! every completion callback is queued to a [`UiLoop`] so it never runs
//! concurrently with other UI code. Callbacks that capture UI-owned objects
//! must additionally be wrapped with an [`AliveFlag`] or a
//! [`GenerationToken`].

mod guards;
mod spawner;
pub mod ui;

pub use guards::{AliveFlag, Generation, GenerationToken};
pub use spawner::{TaskHandle, TaskSpawner};
pub use ui::{UiDispatcher, UiLoop};
