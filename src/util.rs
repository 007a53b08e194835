pub mod context;
pub mod interruptible;
pub mod object;
pub mod poll;
pub mod retry;
