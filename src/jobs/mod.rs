pub mod invocation;

pub use invocation::Invoker;
