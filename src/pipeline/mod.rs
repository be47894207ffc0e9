//! Render pipeline - mounting a compiled template into the output.
//!
//! # Pipeline
//!
//! ```text
//! data / bindings → root Context → Injection → TemplateInstance → mount at anchor
//!                                                   │
//!                    set() → Observable → unify ────┘
//! ```
//!
//! 1. **root context** - holds the initial data as `INPUT`, or explicit cell
//!    bindings
//! 2. **instantiate** - the template's injection derives the instance scope,
//!    the skeleton is materialized and every effect applied and bound
//! 3. **mount** - roots are attached to the anchor, effects mounted
//!
//! After that every change flows through observable subscriptions; nothing
//! in this module runs again until the handle is unmounted or disposed.

pub mod mount;

pub use mount::RenderHandle;
