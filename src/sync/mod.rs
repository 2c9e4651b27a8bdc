pub mod signal;

pub use signal::ExitSignal;
