//! CLI command handlers.
//!
//! - `monitor`: `run` and `once`, which drive the orchestrator.
//! - `inspect`: `events`, `reputation` and `init`, which only touch files.

pub mod inspect;
pub mod monitor;

/// Print a serializable value as JSON, handling serialization errors
/// gracefully instead of panicking.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize response: {e}"),
    }
}
