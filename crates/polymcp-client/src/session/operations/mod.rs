//! Session operations grouped by capability area.
//!
//! Each submodule contributes one `impl Session` block: tools, resources,
//! prompts, and connection-level operations such as ping and roots.

mod connection;
mod prompts;
mod resources;
mod tools;
