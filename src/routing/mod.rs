//! # Directive Routing
//!
//! The handler binding table and the routing gateway that sits between the
//! turn processor and the opaque handlers. The table resolves a directive's
//! `(namespace, name)` key to a handler-plus-policy binding with atomic
//! batch mutation semantics; the gateway forwards lifecycle calls and
//! surfaces unroutable directives diagnostically.

pub mod router;
pub mod table;

pub use router::DirectiveRouter;
pub use table::HandlerBindingTable;
