pub mod conductor;
pub mod console_display;
pub mod context;
pub mod data_logger;
pub mod dispatch;
pub mod groove;
pub mod motion;
pub mod osc_output;
pub mod session_arc;
pub mod simulator;
pub mod synth;
pub mod tuning;
pub mod types;
pub mod void_layer;
