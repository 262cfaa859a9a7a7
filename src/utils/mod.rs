pub mod hosted_tts;
pub mod synth;
