pub mod debounce;
pub mod detector;
