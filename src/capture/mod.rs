pub mod block;
pub mod producer;
#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;
pub mod source;
