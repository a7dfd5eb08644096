//! Commonly used imports
//!
//! Use `use strand::prelude::*;` for quick access to the most common types and functions.

// Core types
pub use crate::{Computation, Continuation, Coroutine, Error, Operation, Outcome, Status, Step, Suspend};

// Most common constructors
pub use crate::build::{done, fail, from_fn, routine, Scope};

// Operations
pub use crate::ops::{fork, halt, resume, timeout};

// Scheduling
pub use crate::runtime::{Runtime, TaskQueue};

// Execution
pub use crate::handler::run;
