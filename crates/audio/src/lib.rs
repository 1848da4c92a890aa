pub mod analysis;
pub mod dsp;
pub mod io;

pub use analysis::OnsetEnvelope;
pub use dsp::{hann_window, normalize_buffer, PeakLevel};
pub use io::{encode_wav, AudioDecoder};
