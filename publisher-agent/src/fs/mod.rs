//! Local filesystem helpers shared by the manifest scanner and the
//! archive collector.

pub mod walker;
