//! Error types for the deobfuscation pipeline.

/// Errors that can be surfaced from [`crate::deobfuscate`] and
/// [`crate::deobfuscate_with_options`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying ECMAScript parser could not produce a tree, even in
    /// recovery mode.
    #[error("parse error: {0}")]
    Parse(String),
    /// The codegen emitter failed to produce source from a rewritten tree.
    /// Should not occur with the rewrites this crate performs.
    #[error("print error: {0}")]
    Print(String),
    /// A pass invariant was violated. Should not occur; if it does, the
    /// pipeline aborts rather than emit a tree it cannot vouch for.
    #[error("internal error in pass `{pass}`: {detail}")]
    Internal { pass: &'static str, detail: String },
}
