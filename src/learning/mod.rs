pub mod certificate;
pub mod progress;
pub mod sequencer;
pub mod test_engine;
