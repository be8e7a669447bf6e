//! # unpacker-js
//!
//! AST-based deobfuscator for scripts hidden behind a specific, co-designed
//! obfuscation scheme: a large literal-array indirection, a compressed
//! string table decoded through an index function, a global-identifier
//! lookup function, and cosmetic transforms (hex numerals, bracketed
//! property access, `!0`/`!1` boolean encoding).
//!
//! * `codec` decompresses the dictionary-coded string table blob.
//! * `literal` is the partial evaluator used to fold indices and operands.
//! * `discovery` locates the constant arrays, string table, decoder, and
//!   global resolvers in a freshly parsed tree.
//! * `passes` holds the five inliner rewrites the driver orchestrates.
//! * `pipeline` is the driver: [`deobfuscate`] and [`deobfuscate_with_options`].
//!
//! ## Example
//!
//! ```
//! use unpacker_js::deobfuscate;
//! let out = deobfuscate("const A=[0,1,2,3,4,5,6,7,8,9]; x = A[0x3];").expect("deobfuscate failed");
//! assert!(out.contains("x = 3"));
//! ```

pub mod allowlist;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod literal;
pub mod options;
mod parsing;
mod passes;
mod pipeline;

pub use error::Error;
pub use options::{RunOptions, RunStats, STD_OPTIONS};
pub use pipeline::{deobfuscate, deobfuscate_with_options};
