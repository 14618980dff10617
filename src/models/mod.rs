pub mod exchange;
pub mod queue;

// payloads published on every run, in this order
pub const SAMPLE_MESSAGES: &[&str] = &["uno", "dos", "tres", "It just works"];
