//! Feedback-directed optimizer for SSA flow graphs of a dynamically typed
//! language.
//!
//! [`compile::optimize`] runs the default pass pipeline over one function;
//! [`lowering`] describes the calls left afterwards for the code emitter.

pub mod compile;
pub mod entity;
pub mod error;
pub mod ir;
pub mod lowering;
pub mod optimizer;
pub mod pipeline;
pub mod transforms;
