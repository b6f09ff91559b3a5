pub mod sleep;

pub use sleep::SleepHandler;
