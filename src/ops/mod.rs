pub mod assemble;
pub mod check;
pub mod drag;
pub mod flatten;
pub mod order_ops;
pub mod session;
